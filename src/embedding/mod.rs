use crate::config::{Config, EmbeddingProvider};
use crate::models::{HfInferenceClient, OllamaClient};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic embedding client that hashes bytes into a fixed number of slots.
///
/// Used when no encoder is configured and as the fallback whenever the encoder fails.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a new deterministic embedding client instance.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Encode a single text into a normalized vector.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() || self.dimension == 0 {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Feature-extraction embeddings served by the inference endpoint.
pub struct HfEmbeddingClient {
    client: Arc<HfInferenceClient>,
    model: String,
}

impl HfEmbeddingClient {
    /// Wrap an inference client for the given encoder model.
    pub fn new(client: Arc<HfInferenceClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingClient for HfEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.client
            .feature_extraction(&self.model, &texts)
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))
    }
}

/// Embeddings served by the Ollama runtime.
pub struct OllamaEmbeddingClient {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Wrap an Ollama client for the given encoder model.
    pub fn new(client: Arc<OllamaClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.client
            .embed(&self.model, &texts)
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))
    }
}

/// Build the embedding client selected by configuration.
///
/// Returns `None` when the provider needs a backend that is not available (for example the
/// inference endpoint while `HF_OFFLINE` is set); the embedder then relies on hashing alone.
pub fn get_embedding_client(
    config: &Config,
    hf: Option<Arc<HfInferenceClient>>,
    ollama: Option<Arc<OllamaClient>>,
) -> Option<Arc<dyn EmbeddingClient>> {
    match config.embedding_provider {
        EmbeddingProvider::HuggingFace => hf.map(|client| {
            Arc::new(HfEmbeddingClient::new(client, config.embedding_model.clone()))
                as Arc<dyn EmbeddingClient>
        }),
        EmbeddingProvider::Ollama => ollama.map(|client| {
            Arc::new(OllamaEmbeddingClient::new(
                client,
                config.embedding_model.clone(),
            )) as Arc<dyn EmbeddingClient>
        }),
        EmbeddingProvider::Hashed => None,
    }
}

/// Produces one vector per document, never failing.
pub struct Embedder {
    client: Option<Arc<dyn EmbeddingClient>>,
    fallback: HashedEmbeddingClient,
}

impl Embedder {
    /// Combine an optional model-backed client with the hashed fallback.
    pub fn new(client: Option<Arc<dyn EmbeddingClient>>, dimension: usize) -> Self {
        Self {
            client,
            fallback: HashedEmbeddingClient::new(dimension),
        }
    }

    /// Embed `text`, falling back to the hashed encoder when the client fails.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(client) = self.client.as_ref() {
            match client.generate_embeddings(vec![text.to_string()]).await {
                Ok(mut vectors) if vectors.len() == 1 => {
                    if let Some(vector) = vectors.pop() {
                        return vector;
                    }
                }
                Ok(vectors) => {
                    tracing::warn!(
                        returned = vectors.len(),
                        "Embedding provider returned an unexpected vector count; using hashed embedding"
                    );
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Embedding failed; using hashed embedding");
                }
            }
        }
        self.fallback.encode(text)
    }
}
