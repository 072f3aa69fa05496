//! HTTP client for Hugging Face Inference API compatible endpoints.
//!
//! One client serves every pipeline the backend relies on: extractive question answering,
//! image-to-text (OCR and captioning), feature extraction (embeddings), and summarization. The
//! model identifier is part of the URL, so a single client handles every model of a fallback
//! chain.

use crate::config::Config;
use crate::models::types::{
    ImageToText, InferenceBackend, ModelError, QuestionAnswering, SpanPrediction,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Lightweight HTTP client for the inference endpoint.
pub struct HfInferenceClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QaItem {
    answer: String,
    score: f32,
    #[serde(default)]
    start: Option<usize>,
    #[serde(default)]
    end: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QaResponse {
    Single(QaItem),
    Ranked(Vec<QaItem>),
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageToTextResponse {
    Batch(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<Vec<f32>>),
    TokenLevel(Vec<Vec<Vec<f32>>>),
}

#[derive(Debug, Deserialize)]
struct SummaryText {
    summary_text: String,
}

impl HfInferenceClient {
    /// Construct a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        Self::with_base_url(
            &config.hf_inference_url,
            config.hf_api_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Construct a client for an explicit endpoint.
    pub fn with_base_url(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let http = Client::builder()
            .user_agent("visulex/1.0")
            .timeout(timeout)
            .build()?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        tracing::debug!(
            url = %base_url,
            has_api_token = api_token.is_some(),
            "Initialized inference HTTP client"
        );
        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn model_endpoint(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn pipeline_request(&self, model: &str) -> RequestBuilder {
        self.authorized(
            self.http
                .post(self.model_endpoint(model))
                .header("x-wait-for-model", "true"),
        )
    }

    /// Embed every text with a feature-extraction pipeline, mean-pooling token-level output.
    pub async fn feature_extraction(
        &self,
        model: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ModelError> {
        let response = self
            .pipeline_request(model)
            .json(&json!({ "inputs": texts }))
            .send()
            .await?;
        let body: FeatureExtractionResponse = decode(model, response).await?;
        Ok(match body {
            FeatureExtractionResponse::Pooled(vectors) => vectors,
            FeatureExtractionResponse::TokenLevel(batches) => {
                batches.iter().map(|tokens| mean_pool(tokens)).collect()
            }
        })
    }

    /// Summarize `text` with a summarization pipeline.
    pub async fn summarization(
        &self,
        model: &str,
        text: &str,
        max_length: usize,
        min_length: usize,
    ) -> Result<String, ModelError> {
        let response = self
            .pipeline_request(model)
            .json(&json!({
                "inputs": text,
                "parameters": {
                    "max_length": max_length,
                    "min_length": min_length.min(max_length),
                    "do_sample": false,
                    "num_beams": 4,
                }
            }))
            .send()
            .await?;
        let body: Vec<SummaryText> = decode(model, response).await?;
        body.into_iter()
            .next()
            .map(|item| item.summary_text)
            .ok_or_else(|| ModelError::InvalidResponse("empty summarization result".into()))
    }
}

#[async_trait]
impl InferenceBackend for HfInferenceClient {
    async fn ensure_model(&self, model: &str) -> Result<(), ModelError> {
        let response = self
            .authorized(self.http.get(format!("{}/status/{}", self.base_url, model)))
            .send()
            .await?;
        let status: ModelStatus = decode(model, response).await?;
        if let Some(reason) = status.error {
            return Err(ModelError::Unavailable {
                model: model.to_string(),
                reason,
            });
        }
        match status.state.as_deref() {
            Some(state @ ("TooBig" | "Error")) => Err(ModelError::Unavailable {
                model: model.to_string(),
                reason: format!("model state {state}"),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl QuestionAnswering for HfInferenceClient {
    async fn answer_span(
        &self,
        model: &str,
        question: &str,
        context: &str,
    ) -> Result<SpanPrediction, ModelError> {
        let response = self
            .pipeline_request(model)
            .json(&json!({
                "inputs": {
                    "question": question,
                    "context": context,
                }
            }))
            .send()
            .await?;
        let item = match decode::<QaResponse>(model, response).await? {
            QaResponse::Single(item) => item,
            QaResponse::Ranked(items) => items
                .into_iter()
                .next()
                .ok_or_else(|| ModelError::InvalidResponse("no answer candidates".into()))?,
        };
        Ok(SpanPrediction {
            answer: item.answer,
            score: item.score,
            start: item.start,
            end: item.end,
        })
    }
}

#[async_trait]
impl ImageToText for HfInferenceClient {
    async fn image_to_text(&self, model: &str, png: Vec<u8>) -> Result<String, ModelError> {
        let response = self
            .pipeline_request(model)
            .header("content-type", "image/png")
            .body(png)
            .send()
            .await?;
        match decode::<ImageToTextResponse>(model, response).await? {
            ImageToTextResponse::Single(item) => Ok(item.generated_text),
            ImageToTextResponse::Batch(items) => items
                .into_iter()
                .next()
                .map(|item| item.generated_text)
                .ok_or_else(|| ModelError::InvalidResponse("empty image-to-text result".into())),
        }
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
            reason: "model not found on inference endpoint".into(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ModelError::UnexpectedStatus { status, body });
    }
    response.json::<T>().await.map_err(|error| {
        ModelError::InvalidResponse(format!("failed to decode response for {model}: {error}"))
    })
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let mut pooled = vec![0.0_f32; first.len()];
    for token in tokens {
        for (slot, value) in pooled.iter_mut().zip(token) {
            *slot += value;
        }
    }
    let count = tokens.len() as f32;
    for slot in &mut pooled {
        *slot /= count;
    }
    pooled
}
