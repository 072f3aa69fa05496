//! Abstractions for generating document summaries.
//!
//! Summarization is optional; when no provider is configured the processing layer uses the
//! extractive head-and-tail summary. Model-backed summaries fall back to the same extractive
//! form whenever the provider fails.

use crate::config::{Config, SummarizationProvider};
use crate::models::{GenerationOptions, HfInferenceClient, OllamaClient, TextGeneration};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while attempting abstractive summarization.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Text to summarize.
    pub text: String,
    /// Maximum summary length requested by the caller.
    pub max_length: usize,
    /// Minimum summary length requested by the caller.
    pub min_length: usize,
}

/// Interface implemented by abstractive summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Generate a concise summary using the configured model.
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError>;
}

/// Summaries from a summarization pipeline on the inference endpoint.
pub struct HfSummarizationClient {
    client: Arc<HfInferenceClient>,
}

impl HfSummarizationClient {
    /// Wrap an inference client.
    pub fn new(client: Arc<HfInferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SummarizationClient for HfSummarizationClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        self.client
            .summarization(
                &request.model,
                &request.text,
                request.max_length,
                request.min_length,
            )
            .await
            .map(|summary| summary.trim().to_string())
            .map_err(|error| SummarizationClientError::GenerationFailed(error.to_string()))
    }
}

/// Summaries written by a generative model on the Ollama runtime.
pub struct OllamaSummarizationClient {
    client: Arc<OllamaClient>,
}

impl OllamaSummarizationClient {
    /// Wrap an Ollama client.
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

fn build_summary_prompt(text: &str, max_length: usize) -> String {
    format!(
        "System: You summarize documents into a short factual paragraph. Avoid speculation. Return at most {max_length} words.\n\nDocument:\n{text}\n\nSummary:"
    )
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        let prompt = build_summary_prompt(&request.text, request.max_length);
        // Lower temperature for deterministic summaries.
        let options = GenerationOptions {
            temperature: 0.1,
            top_p: 0.9,
            max_new_tokens: request.max_length * 2,
        };
        self.client
            .generate(&request.model, &prompt, options)
            .await
            .map(|summary| summary.trim().to_string())
            .map_err(|error| SummarizationClientError::GenerationFailed(error.to_string()))
    }
}

/// Build a summarization client based on configuration.
pub fn get_summarization_client(
    config: &Config,
    hf: Option<Arc<HfInferenceClient>>,
    ollama: Option<Arc<OllamaClient>>,
) -> Option<Arc<dyn SummarizationClient>> {
    match config.summarization_provider {
        SummarizationProvider::None => None,
        SummarizationProvider::HuggingFace => hf.map(|client| {
            Arc::new(HfSummarizationClient::new(client)) as Arc<dyn SummarizationClient>
        }),
        SummarizationProvider::Ollama => ollama.map(|client| {
            Arc::new(OllamaSummarizationClient::new(client)) as Arc<dyn SummarizationClient>
        }),
    }
}

/// Head-and-tail summary bounded by `max_length` characters.
///
/// Texts longer than the budget keep their first and last `max_length / 2` characters joined by
/// an ellipsis; shorter texts are returned unchanged.
pub fn extractive_summary(text: &str, max_length: usize) -> String {
    let length = text.chars().count();
    if length <= max_length {
        return text.to_string();
    }

    let half = max_length / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(length - half).collect();
    format!("{head}...{tail}")
}

/// Chooses between abstractive and extractive summaries.
pub struct Summarizer {
    client: Option<Arc<dyn SummarizationClient>>,
    model: String,
    max_length: usize,
    min_length: usize,
}

impl Summarizer {
    /// Build a summarizer with an optional abstractive client.
    pub fn new(
        client: Option<Arc<dyn SummarizationClient>>,
        model: String,
        max_length: usize,
        min_length: usize,
    ) -> Self {
        Self {
            client,
            model,
            max_length,
            min_length,
        }
    }

    /// Summarize `text`, falling back to the extractive form on any provider failure.
    pub async fn summarize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        if let Some(client) = self.client.as_ref() {
            let request = SummarizationRequest {
                model: self.model.clone(),
                text: text.to_string(),
                max_length: self.max_length,
                min_length: self.min_length,
            };
            match client.generate_summary(request).await {
                Ok(summary) if !summary.trim().is_empty() => return summary.trim().to_string(),
                Ok(_) => {
                    tracing::warn!(
                        model = %self.model,
                        "Summarization returned empty text; falling back to extractive"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        model = %self.model,
                        error = %error,
                        "Abstractive summarization failed; falling back to extractive"
                    );
                }
            }
        }

        extractive_summary(text, self.max_length)
    }
}
