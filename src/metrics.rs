use crate::qa::AnswerSource;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_processed: AtomicU64,
    bytes_ingested: AtomicU64,
    questions_answered: AtomicU64,
    keyword_answers: AtomicU64,
    extractive_answers: AtomicU64,
    generative_answers: AtomicU64,
    fallback_answers: AtomicU64,
    ocr_fallbacks: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and its size in bytes.
    pub fn record_document(&self, size_bytes: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_ingested.fetch_add(size_bytes, Ordering::Relaxed);
    }

    /// Record an answered question by the path that produced the answer.
    pub fn record_answer(&self, source: AnswerSource) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        let counter = match source {
            AnswerSource::Keyword => &self.keyword_answers,
            AnswerSource::Extractive => &self.extractive_answers,
            AnswerSource::Generative => &self.generative_answers,
            AnswerSource::Fallback => &self.fallback_answers,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an image whose text came from the heuristic description instead of OCR.
    pub fn record_ocr_fallback(&self) {
        self.ocr_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            keyword_answers: self.keyword_answers.load(Ordering::Relaxed),
            extractive_answers: self.extractive_answers.load(Ordering::Relaxed),
            generative_answers: self.generative_answers.load(Ordering::Relaxed),
            fallback_answers: self.fallback_answers.load(Ordering::Relaxed),
            ocr_fallbacks: self.ocr_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents processed since startup.
    pub documents_processed: u64,
    /// Total size of all processed uploads.
    pub bytes_ingested: u64,
    /// Number of questions answered, whatever the path.
    pub questions_answered: u64,
    /// Answers served by the keyword table.
    pub keyword_answers: u64,
    /// Answers served by an extractive QA model.
    pub extractive_answers: u64,
    /// Answers served by a generative model.
    pub generative_answers: u64,
    /// Canned error answers.
    pub fallback_answers: u64,
    /// Images described heuristically because OCR produced nothing usable.
    pub ocr_fallbacks: u64,
}
