//! Document service coordinating extraction, summarization, embedding, storage, and QA.

use crate::{
    config::{Config, SummarizationProvider},
    embedding::{Embedder, get_embedding_client},
    extraction::{DocumentExtractor, FileKind, OcrProvenance, classify},
    metrics::{MetricsSnapshot, ServiceMetrics},
    models::{
        HfInferenceClient, ImageToText, ModelError, ModelRegistry, OllamaClient,
        QuestionAnswering, TextGeneration,
    },
    processing::{
        sanitize::{effective_file_type, sanitize_filename, sanitize_string},
        types::{
            BackendFlags, ConfiguredModels, HealthSnapshot, ProcessingError, UploadOutcome,
            UploadedFile,
        },
    },
    qa::{QaAnswer, QaEngine, QaSettings},
    store::{
        DocumentRecord, DocumentStore, DocumentSummary, content_hash, current_timestamp_rfc3339,
    },
    summarization::{Summarizer, get_summarization_client},
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Inference clients shared by every pipeline.
#[derive(Clone, Default)]
pub struct Backends {
    /// Hugging Face compatible inference endpoint; absent when running offline.
    pub huggingface: Option<Arc<HfInferenceClient>>,
    /// Ollama runtime.
    pub ollama: Option<Arc<OllamaClient>>,
}

impl Backends {
    /// Build the HTTP clients described by configuration.
    pub fn from_config(config: &Config) -> Result<Self, ModelError> {
        let huggingface = if config.hf_offline {
            tracing::info!("HF_OFFLINE set; Hugging Face models disabled");
            None
        } else {
            Some(Arc::new(HfInferenceClient::new(config)?))
        };
        let ollama = Some(Arc::new(OllamaClient::new(config)?));
        Ok(Self {
            huggingface,
            ollama,
        })
    }
}

/// Abstraction over the document pipeline used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Extract, summarize, embed, and store an uploaded file.
    async fn upload(&self, file: UploadedFile) -> Result<UploadOutcome, ProcessingError>;

    /// Answer a question about a stored document.
    async fn ask(
        &self,
        doc_id: &str,
        question: &str,
        model: Option<&str>,
    ) -> Result<QaAnswer, ProcessingError>;

    /// List stored documents in upload order.
    async fn history(&self) -> Vec<DocumentSummary>;

    /// Fetch a stored document.
    async fn document(&self, doc_id: &str) -> Result<Arc<DocumentRecord>, ProcessingError>;

    /// Report configured and loaded models.
    async fn health(&self) -> HealthSnapshot;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the long-lived pipeline components.
///
/// Construct once near process start and share through an `Arc`.
pub struct DocumentService {
    extractor: DocumentExtractor,
    summarizer: Summarizer,
    embedder: Embedder,
    qa: QaEngine,
    store: DocumentStore,
    metrics: Arc<ServiceMetrics>,
    max_file_size: usize,
    models: ConfiguredModels,
    backends: BackendFlags,
}

impl DocumentService {
    /// Wire every pipeline to the given backends.
    pub fn new(config: &Config, backends: Backends) -> Self {
        let Backends {
            huggingface,
            ollama,
        } = backends;

        let ocr = huggingface
            .clone()
            .map(|client| client as Arc<dyn ImageToText>);
        let extractive = huggingface
            .clone()
            .map(|client| client as Arc<dyn QuestionAnswering>);
        let generative = ollama
            .clone()
            .map(|client| client as Arc<dyn TextGeneration>);

        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedder = Embedder::new(
            get_embedding_client(config, huggingface.clone(), ollama.clone()),
            config.embedding_dimension,
        );
        let summarizer = Summarizer::new(
            get_summarization_client(config, huggingface.clone(), ollama.clone()),
            config.summarization_model.clone(),
            config.summary_max_length,
            config.summary_min_length,
        );
        let qa = QaEngine::new(
            extractive,
            generative,
            Arc::new(ModelRegistry::new()),
            QaSettings::from_config(config),
        );

        let models = ConfiguredModels {
            qa: config.qa_models.clone(),
            generative: config.generative_model.clone(),
            ocr: config.ocr_models.clone(),
            embedding_provider: config.embedding_provider.as_str().to_string(),
            embedding: config.embedding_model.clone(),
            summarization: (config.summarization_provider != SummarizationProvider::None)
                .then(|| config.summarization_model.clone()),
        };

        Self {
            extractor: DocumentExtractor::new(ocr, config.ocr_models.clone()),
            summarizer,
            embedder,
            qa,
            store: DocumentStore::new(),
            metrics: Arc::new(ServiceMetrics::new()),
            max_file_size: config.max_file_size,
            models,
            backends: BackendFlags {
                huggingface: huggingface.is_some(),
                ollama: ollama.is_some(),
            },
        }
    }

    async fn find(&self, doc_id: &str) -> Result<Arc<DocumentRecord>, ProcessingError> {
        let not_found = || ProcessingError::DocumentNotFound(doc_id.to_string());
        let id = Uuid::parse_str(doc_id.trim()).map_err(|_| not_found())?;
        self.store.get(&id).await.ok_or_else(not_found)
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(&self, file: UploadedFile) -> Result<UploadOutcome, ProcessingError> {
        let UploadedFile {
            filename,
            content_type,
            bytes,
        } = file;
        let filename = sanitize_filename(&filename);
        let size = bytes.len();
        if size == 0 {
            return Err(ProcessingError::EmptyUpload);
        }
        if size > self.max_file_size {
            return Err(ProcessingError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let kind = classify(content_type.as_deref(), &filename)?;
        let file_type = effective_file_type(content_type.as_deref(), &filename, kind);
        tracing::info!(filename = %filename, file_type = %file_type, size, "Processing upload");

        let sha256 = content_hash(&bytes);
        let extracted = self.extractor.extract(kind, bytes).await?;
        if extracted.ocr == Some(OcrProvenance::Heuristic) {
            self.metrics.record_ocr_fallback();
        }

        let summary = match kind {
            FileKind::Image => extracted.text.clone(),
            FileKind::Pdf | FileKind::Text => self.summarizer.summarize(&extracted.text).await,
        };
        let embedding = self.embedder.embed(&extracted.text).await;

        let record = self
            .store
            .insert(DocumentRecord {
                id: Uuid::new_v4(),
                filename,
                file_type,
                kind,
                text: extracted.text,
                summary,
                embedding,
                sha256,
                size_bytes: size as u64,
                uploaded_at: current_timestamp_rfc3339(),
                sequence: 0,
            })
            .await?;
        self.metrics.record_document(record.size_bytes);
        tracing::info!(
            doc_id = %record.id,
            filename = %record.filename,
            chars = record.text.chars().count(),
            "Document processed"
        );

        Ok(UploadOutcome {
            doc_id: record.id,
            filename: record.filename.clone(),
            file_type: record.file_type.clone(),
            summary: record.summary.clone(),
        })
    }

    async fn ask(
        &self,
        doc_id: &str,
        question: &str,
        model: Option<&str>,
    ) -> Result<QaAnswer, ProcessingError> {
        let question = sanitize_string(Some(question)).ok_or(ProcessingError::EmptyQuestion)?;
        let record = self.find(doc_id).await?;
        tracing::info!(doc_id = %record.id, question = %question, "Answering question");

        let answer = self.qa.answer(&question, &record.text, model).await;
        self.metrics.record_answer(answer.source);
        tracing::info!(
            doc_id = %record.id,
            source = ?answer.source,
            confidence = answer.confidence,
            "Question answered"
        );
        Ok(answer)
    }

    async fn history(&self) -> Vec<DocumentSummary> {
        self.store
            .list()
            .await
            .iter()
            .map(|record| DocumentSummary::from(record.as_ref()))
            .collect()
    }

    async fn document(&self, doc_id: &str) -> Result<Arc<DocumentRecord>, ProcessingError> {
        self.find(doc_id).await
    }

    async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            models: self.models.clone(),
            loaded_models: self.qa.loaded_models().await,
            documents: self.store.len().await,
            backends: self.backends,
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
