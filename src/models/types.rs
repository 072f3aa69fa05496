//! Shared types used by the inference backends and the model registry.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Errors returned while loading or invoking a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backend reported that the model cannot be served.
    #[error("Model '{model}' is unavailable: {reason}")]
    Unavailable {
        /// Model identifier that failed to load.
        model: String,
        /// Diagnostic returned by the backend.
        reason: String,
    },
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend responded with an unexpected status code.
    #[error("Unexpected model response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The response body could not be interpreted.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
    /// Every model of a fallback chain failed to load.
    #[error("Failed to load any model from [{candidates}]")]
    NoModelLoaded {
        /// Comma separated list of the attempted models.
        candidates: String,
    },
}

/// How a question-answering model produces its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Predicts an answer span inside the context.
    Extractive,
    /// Writes a free-form answer from a prompt.
    Generative,
}

/// One entry of a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model identifier understood by the backend.
    pub name: String,
    /// Backend family serving the model.
    pub kind: ModelKind,
}

impl ModelSpec {
    /// Extractive QA model served by the inference endpoint.
    pub fn extractive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Extractive,
        }
    }

    /// Generative model served by the Ollama runtime.
    pub fn generative(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Generative,
        }
    }
}

/// A model resolved by the registry and cached under the name that was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedModel {
    /// Cache key (the model the caller asked for).
    pub requested: String,
    /// Model that actually loaded.
    pub resolved: String,
    /// Backend family of the resolved model.
    pub kind: ModelKind,
}

/// Answer span predicted by an extractive QA model.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanPrediction {
    /// Decoded answer text.
    pub answer: String,
    /// Model confidence.
    pub score: f32,
    /// Start offset in the context, when reported.
    pub start: Option<usize>,
    /// End offset in the context, when reported.
    pub end: Option<usize>,
}

/// Sampling parameters for generative models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Maximum number of tokens to generate.
    pub max_new_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_new_tokens: 100,
        }
    }
}

/// Common load step shared by every backend.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Confirm that `model` can be served, loading it on the backend if needed.
    async fn ensure_model(&self, model: &str) -> Result<(), ModelError>;
}

/// Backends able to extract an answer span from a context.
#[async_trait]
pub trait QuestionAnswering: InferenceBackend {
    /// Predict the answer to `question` inside `context`.
    async fn answer_span(
        &self,
        model: &str,
        question: &str,
        context: &str,
    ) -> Result<SpanPrediction, ModelError>;
}

/// Backends able to continue a prompt.
#[async_trait]
pub trait TextGeneration: InferenceBackend {
    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, ModelError>;
}

/// Backends able to read text out of an image.
#[async_trait]
pub trait ImageToText: InferenceBackend {
    /// Run an image-to-text pipeline over PNG encoded bytes.
    async fn image_to_text(&self, model: &str, png: Vec<u8>) -> Result<String, ModelError>;
}
