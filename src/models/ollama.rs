//! Ollama runtime client for generative answers, summaries, and embeddings.
//!
//! Requests go straight to the runtime's HTTP API; streaming is disabled so each call returns a
//! single JSON document.

use crate::config::Config;
use crate::models::types::{GenerationOptions, InferenceBackend, ModelError, TextGeneration};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// HTTP client for a local Ollama runtime.
pub struct OllamaClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Construct a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        Self::with_base_url(
            &config.ollama_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Construct a client for an explicit runtime URL.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ModelError> {
        let http = Client::builder()
            .user_agent("visulex/1.0")
            .timeout(timeout)
            .build()?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        tracing::debug!(url = %base_url, "Initialized Ollama HTTP client");
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Embed every text with `/api/embed`.
    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let response = self
            .http
            .post(self.endpoint("embed"))
            .json(&json!({ "model": model, "input": texts }))
            .send()
            .await?;
        let body: EmbedResponse = decode(model, response).await?;
        Ok(body.embeddings)
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn ensure_model(&self, model: &str) -> Result<(), ModelError> {
        let response = self
            .http
            .post(self.endpoint("show"))
            .json(&json!({ "model": model }))
            .send()
            .await?;
        decode::<serde_json::Value>(model, response).await.map(|_| ())
    }
}

#[async_trait]
impl TextGeneration for OllamaClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, ModelError> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "top_p": options.top_p,
                "num_predict": options.max_new_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint("generate"))
            .json(&payload)
            .send()
            .await?;
        let body: GenerateResponse = decode(model, response).await?;

        if !body.done {
            return Err(ModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

async fn decode<T>(model: &str, response: Response) -> Result<T, ModelError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ModelError::Unavailable {
            model: model.to_string(),
            reason: "model not pulled on the Ollama runtime".into(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ModelError::UnexpectedStatus { status, body });
    }
    response.json::<T>().await.map_err(|error| {
        ModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
    })
}
