#![deny(missing_docs)]

//! Core library for the VisuLex document-understanding backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from PDFs, images, and plain text.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Inference backends and the model registry.
pub mod models;
/// Document pipeline and the API it exposes to the HTTP layer.
pub mod processing;
/// Question answering cascade.
pub mod qa;
/// In-memory document store.
pub mod store;
/// Summary generation.
pub mod summarization;
