//! Inference backends, the model registry, and their shared types.

pub mod huggingface;
pub mod ollama;
pub mod registry;
pub mod types;

pub use huggingface::HfInferenceClient;
pub use ollama::OllamaClient;
pub use registry::{ModelLoader, ModelRegistry};
pub use types::{
    GenerationOptions, ImageToText, InferenceBackend, LoadedModel, ModelError, ModelKind,
    ModelSpec, QuestionAnswering, SpanPrediction, TextGeneration,
};
