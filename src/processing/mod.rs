//! Document pipeline: validation, extraction, summarization, embedding, storage, and QA.

pub mod sanitize;
mod service;
pub mod types;

pub use service::{Backends, DocumentApi, DocumentService};
pub use types::{
    BackendFlags, ConfiguredModels, HealthSnapshot, ProcessingError, UploadOutcome, UploadedFile,
};
