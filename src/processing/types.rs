//! Core data types and error definitions for the document service.

use crate::extraction::ExtractionError;
use crate::models::LoadedModel;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors emitted by the document service.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The upload carried no bytes.
    #[error("Uploaded file is empty")]
    EmptyUpload,
    /// The upload exceeds the configured size limit.
    #[error("File is too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge {
        /// Size of the upload.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The store rejected the record.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// No document exists under the requested id.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// The question was blank.
    #[error("Question must not be empty")]
    EmptyQuestion,
}

/// A file received by the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename supplied by the client.
    pub filename: String,
    /// Content type supplied by the client.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// Identifier of the stored document.
    pub doc_id: Uuid,
    /// Sanitized filename.
    pub filename: String,
    /// Content type recorded for the document.
    pub file_type: String,
    /// Summary of the extracted text.
    pub summary: String,
}

/// Models the service was configured with.
#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredModels {
    /// Extractive QA chain.
    pub qa: Vec<String>,
    /// Generative fallback model.
    pub generative: Option<String>,
    /// OCR chain.
    pub ocr: Vec<String>,
    /// Embedding provider name.
    pub embedding_provider: String,
    /// Embedding model.
    pub embedding: String,
    /// Summarization model, when a provider is enabled.
    pub summarization: Option<String>,
}

/// Which inference backends were constructed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BackendFlags {
    /// Hugging Face compatible inference endpoint.
    pub huggingface: bool,
    /// Ollama runtime.
    pub ollama: bool,
}

/// Service state reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Configured model chains.
    pub models: ConfiguredModels,
    /// Models resolved so far.
    pub loaded_models: Vec<LoadedModel>,
    /// Stored document count.
    pub documents: usize,
    /// Constructed backends.
    pub backends: BackendFlags,
}
