//! Question answering over a document's text.
//!
//! Answers come from a cascade: the keyword table first, then a model resolved through the
//! registry's fallback chain. Extractive models read overlapping token windows of the context
//! and the best-scoring span wins; generative models are prompted with a token-bounded context.
//! Model failures never surface as errors to the caller: they become canned answers with zero
//! confidence.

pub mod keywords;
pub mod windows;

use crate::config::Config;
use crate::models::{
    GenerationOptions, LoadedModel, ModelError, ModelKind, ModelLoader, ModelRegistry, ModelSpec,
    QuestionAnswering, SpanPrediction, TextGeneration,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub use keywords::keyword_answer;
pub use windows::{TokenCounter, build_token_counter, context_windows, truncate_to_tokens};

/// Returned when the model found no usable span.
pub const NOT_FOUND_ANSWER: &str = "Answer not found in the provided context.";
/// Returned when no model of the chain could be loaded.
pub const LOAD_FAILURE_ANSWER: &str =
    "An error occurred while processing the question. Please try rephrasing it.";
/// Returned when the extractive model call fails.
pub const QA_FAILURE_ANSWER: &str = "The QA model failed. Please try a different question.";
/// Returned when the generative model call fails.
pub const GENERATIVE_FAILURE_ANSWER: &str =
    "The generative model failed. Please try a different question.";

const KEYWORD_CONFIDENCE: f32 = 0.7;
const GENERATIVE_CONFIDENCE: f32 = 0.8;
const GENERATIVE_EMPTY_CONFIDENCE: f32 = 0.5;
const SPECIAL_TOKENS: [&str; 4] = ["<s>", "</s>", "<pad>", "<unk>"];

/// Which stage of the cascade produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    /// Keyword table.
    Keyword,
    /// Extractive QA model.
    Extractive,
    /// Generative model.
    Generative,
    /// Canned answer after a failure.
    Fallback,
}

/// Answer to a question about a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaAnswer {
    /// Answer text.
    pub answer: String,
    /// Confidence in `[0, 1]` for keyword and generative answers; the model score otherwise.
    pub confidence: f32,
    /// Start offset of the span inside the window it came from.
    pub start: usize,
    /// End offset of the span inside the window it came from.
    pub end: usize,
    /// Stage of the cascade that answered.
    pub source: AnswerSource,
    /// Model that produced the answer, when one was involved.
    pub model: Option<String>,
}

impl QaAnswer {
    fn keyword(answer: String) -> Self {
        Self {
            answer,
            confidence: KEYWORD_CONFIDENCE,
            start: 0,
            end: 0,
            source: AnswerSource::Keyword,
            model: None,
        }
    }

    fn fallback(answer: &str, model: Option<String>) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 0.0,
            start: 0,
            end: 0,
            source: AnswerSource::Fallback,
            model,
        }
    }
}

/// Tunables for the model stage of the cascade.
#[derive(Debug, Clone)]
pub struct QaSettings {
    /// Extractive models, in fallback order.
    pub qa_models: Vec<String>,
    /// Generative model closing the chain.
    pub generative_model: Option<String>,
    /// Characters of document text used as context.
    pub max_text_length: usize,
    /// Token budget of one window (and of a generative prompt).
    pub max_tokens: usize,
    /// Token overlap between windows.
    pub stride: usize,
    /// Windows evaluated per question.
    pub max_windows: usize,
}

impl QaSettings {
    /// Read the QA settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            qa_models: config.qa_models.clone(),
            generative_model: config.generative_model.clone(),
            max_text_length: config.max_text_length,
            max_tokens: config.qa_max_tokens,
            stride: config.qa_stride,
            max_windows: config.qa_max_windows,
        }
    }
}

/// Runs the answer cascade.
pub struct QaEngine {
    extractive: Option<Arc<dyn QuestionAnswering>>,
    generative: Option<Arc<dyn TextGeneration>>,
    registry: Arc<ModelRegistry>,
    settings: QaSettings,
    counter: TokenCounter,
}

impl QaEngine {
    /// Build an engine; either backend may be absent, in which case its models never load.
    pub fn new(
        extractive: Option<Arc<dyn QuestionAnswering>>,
        generative: Option<Arc<dyn TextGeneration>>,
        registry: Arc<ModelRegistry>,
        settings: QaSettings,
    ) -> Self {
        let counter = build_token_counter(
            settings
                .qa_models
                .first()
                .map(String::as_str)
                .unwrap_or_default(),
        );
        Self::with_token_counter(extractive, generative, registry, settings, counter)
    }

    /// Build an engine with an explicit token counter.
    pub fn with_token_counter(
        extractive: Option<Arc<dyn QuestionAnswering>>,
        generative: Option<Arc<dyn TextGeneration>>,
        registry: Arc<ModelRegistry>,
        settings: QaSettings,
        counter: TokenCounter,
    ) -> Self {
        Self {
            extractive,
            generative,
            registry,
            settings,
            counter,
        }
    }

    /// Configured models, for health reporting.
    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    /// Models resolved so far.
    pub async fn loaded_models(&self) -> Vec<LoadedModel> {
        self.registry.loaded().await
    }

    /// Answer `question` about `context`, optionally with a specific model.
    pub async fn answer(&self, question: &str, context: &str, model: Option<&str>) -> QaAnswer {
        if let Some(answer) = keyword_answer(question, context) {
            tracing::info!(answer = %answer, "Answered from keyword table");
            return QaAnswer::keyword(answer);
        }

        let requested = model.map(str::trim).filter(|name| !name.is_empty());
        let Some(key) = requested
            .or_else(|| self.settings.qa_models.first().map(String::as_str))
            .or(self.settings.generative_model.as_deref())
        else {
            tracing::error!("No question-answering models configured");
            return QaAnswer::fallback(LOAD_FAILURE_ANSWER, None);
        };

        let candidates = self.candidates(requested);
        let loaded = match self.registry.load_first(key, &candidates, self).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::error!(model = key, error = %error, "Failed to load a QA model");
                return QaAnswer::fallback(LOAD_FAILURE_ANSWER, None);
            }
        };

        let context = truncate_chars(context, self.settings.max_text_length);
        match loaded.kind {
            ModelKind::Extractive => self.answer_extractive(&loaded.resolved, question, context).await,
            ModelKind::Generative => self.answer_generative(&loaded.resolved, question, context).await,
        }
    }

    fn candidates(&self, requested: Option<&str>) -> Vec<ModelSpec> {
        let mut chain = Vec::with_capacity(self.settings.qa_models.len() + 2);
        if let Some(name) = requested {
            let known = self.settings.qa_models.iter().any(|model| model == name)
                || self.settings.generative_model.as_deref() == Some(name);
            if !known {
                chain.push(ModelSpec::extractive(name));
            }
        }
        chain.extend(self.settings.qa_models.iter().map(ModelSpec::extractive));
        chain.extend(self.settings.generative_model.iter().map(ModelSpec::generative));
        chain
    }

    async fn answer_extractive(&self, model: &str, question: &str, context: &str) -> QaAnswer {
        let Some(backend) = self.extractive.as_ref() else {
            return QaAnswer::fallback(QA_FAILURE_ANSWER, Some(model.to_string()));
        };

        let windows = match self.windows_for(context).await {
            Ok(windows) => windows,
            Err(error) => {
                tracing::error!(model, error = %error, "Context windowing task failed");
                return QaAnswer::fallback(QA_FAILURE_ANSWER, Some(model.to_string()));
            }
        };
        tracing::debug!(model, windows = windows.len(), "Running extractive QA");

        let mut best: Option<SpanPrediction> = None;
        for window in &windows {
            match backend.answer_span(model, question, window).await {
                Ok(prediction) => {
                    if best.as_ref().is_none_or(|current| prediction.score > current.score) {
                        best = Some(prediction);
                    }
                }
                Err(error) => {
                    tracing::error!(model, error = %error, "QA model call failed");
                    return QaAnswer::fallback(QA_FAILURE_ANSWER, Some(model.to_string()));
                }
            }
        }

        let not_found = QaAnswer {
            answer: NOT_FOUND_ANSWER.to_string(),
            confidence: 0.0,
            start: 0,
            end: 0,
            source: AnswerSource::Extractive,
            model: Some(model.to_string()),
        };
        let Some(prediction) = best else {
            return not_found;
        };
        if let (Some(start), Some(end)) = (prediction.start, prediction.end) {
            if start >= end {
                tracing::debug!(model, start, end, "Model returned an empty span");
                return not_found;
            }
        }

        let answer = strip_special_tokens(&prediction.answer);
        if answer.is_empty() {
            return not_found;
        }
        QaAnswer {
            answer,
            confidence: prediction.score,
            start: prediction.start.unwrap_or_default(),
            end: prediction.end.unwrap_or_default(),
            source: AnswerSource::Extractive,
            model: Some(model.to_string()),
        }
    }

    /// Tokenizing is CPU bound, so windows are built off the async workers.
    async fn windows_for(&self, context: &str) -> Result<Vec<String>, tokio::task::JoinError> {
        let context = context.to_string();
        let counter = self.counter.clone();
        let (max_tokens, stride, max_windows) = (
            self.settings.max_tokens,
            self.settings.stride,
            self.settings.max_windows,
        );
        tokio::task::spawn_blocking(move || {
            context_windows(&context, max_tokens, stride, max_windows, &counter)
        })
        .await
    }

    async fn answer_generative(&self, model: &str, question: &str, context: &str) -> QaAnswer {
        let Some(backend) = self.generative.as_ref() else {
            return QaAnswer::fallback(GENERATIVE_FAILURE_ANSWER, Some(model.to_string()));
        };

        let prompt = self.build_prompt(question, context);
        let generated = match backend
            .generate(model, &prompt, GenerationOptions::default())
            .await
        {
            Ok(generated) => generated,
            Err(error) => {
                tracing::error!(model, error = %error, "Generative model call failed");
                return QaAnswer::fallback(GENERATIVE_FAILURE_ANSWER, Some(model.to_string()));
            }
        };

        let answer = strip_special_tokens(generated.strip_prefix(&prompt).unwrap_or(&generated));
        let (answer, confidence) = if answer.is_empty() {
            (NOT_FOUND_ANSWER.to_string(), GENERATIVE_EMPTY_CONFIDENCE)
        } else {
            (answer, GENERATIVE_CONFIDENCE)
        };
        QaAnswer {
            answer,
            confidence,
            start: 0,
            end: 0,
            source: AnswerSource::Generative,
            model: Some(model.to_string()),
        }
    }

    /// `Context: ...\nQuestion: ...\nAnswer:` with the context cut to fit the token budget.
    fn build_prompt(&self, question: &str, context: &str) -> String {
        let overhead = self.counter.as_ref()(&format_prompt(question, ""));
        let budget = self.settings.max_tokens.saturating_sub(overhead);
        let context = truncate_to_tokens(context, budget, &self.counter);
        format_prompt(question, &context)
    }
}

#[async_trait]
impl ModelLoader for QaEngine {
    async fn load(&self, spec: &ModelSpec) -> Result<(), ModelError> {
        let unavailable = |backend: &str| ModelError::Unavailable {
            model: spec.name.clone(),
            reason: format!("{backend} backend is not configured"),
        };
        match spec.kind {
            ModelKind::Extractive => match self.extractive.as_ref() {
                Some(backend) => backend.ensure_model(&spec.name).await,
                None => Err(unavailable("question-answering")),
            },
            ModelKind::Generative => match self.generative.as_ref() {
                Some(backend) => backend.ensure_model(&spec.name).await,
                None => Err(unavailable("generative")),
            },
        }
    }
}

fn format_prompt(question: &str, context: &str) -> String {
    format!("Context: {context}\nQuestion: {question}\nAnswer:")
}

fn strip_special_tokens(text: &str) -> String {
    let mut cleaned = text.to_string();
    for token in SPECIAL_TOKENS {
        cleaned = cleaned.replace(token, "");
    }
    cleaned.trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InferenceBackend;
    use crate::qa::windows::whitespace_token_counter;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubQa {
        available: HashSet<String>,
        predictions: Mutex<Vec<Result<SpanPrediction, String>>>,
        contexts: Mutex<Vec<String>>,
    }

    impl StubQa {
        fn serving(models: &[&str]) -> Self {
            Self {
                available: models.iter().map(|model| model.to_string()).collect(),
                ..Self::default()
            }
        }

        fn respond(self, responses: Vec<Result<SpanPrediction, String>>) -> Self {
            *self.predictions.lock().expect("predictions lock") = responses;
            self
        }
    }

    #[async_trait]
    impl InferenceBackend for StubQa {
        async fn ensure_model(&self, model: &str) -> Result<(), ModelError> {
            if self.available.contains(model) {
                Ok(())
            } else {
                Err(ModelError::Unavailable {
                    model: model.to_string(),
                    reason: "missing".into(),
                })
            }
        }
    }

    #[async_trait]
    impl QuestionAnswering for StubQa {
        async fn answer_span(
            &self,
            _model: &str,
            _question: &str,
            context: &str,
        ) -> Result<SpanPrediction, ModelError> {
            self.contexts
                .lock()
                .expect("contexts lock")
                .push(context.to_string());
            let mut predictions = self.predictions.lock().expect("predictions lock");
            if predictions.is_empty() {
                return Err(ModelError::InvalidResponse("no scripted prediction".into()));
            }
            predictions.remove(0).map_err(ModelError::InvalidResponse)
        }
    }

    struct StubGenerator {
        output: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn new(output: Result<&str, &str>) -> Self {
            Self {
                output: output.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for StubGenerator {
        async fn ensure_model(&self, _model: &str) -> Result<(), ModelError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TextGeneration for StubGenerator {
        async fn generate(
            &self,
            _model: &str,
            prompt: &str,
            _options: GenerationOptions,
        ) -> Result<String, ModelError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(prompt.to_string());
            match &self.output {
                Ok(text) if text == "<echo>" => Ok(format!("{prompt} echoed answer")),
                Ok(text) => Ok(text.clone()),
                Err(reason) => Err(ModelError::InvalidResponse(reason.clone())),
            }
        }
    }

    fn settings() -> QaSettings {
        QaSettings {
            qa_models: vec!["roberta".into(), "distilbert".into()],
            generative_model: Some("llama".into()),
            max_text_length: 10_000,
            max_tokens: 20,
            stride: 5,
            max_windows: 8,
        }
    }

    fn span(answer: &str, score: f32, start: usize, end: usize) -> SpanPrediction {
        SpanPrediction {
            answer: answer.into(),
            score,
            start: Some(start),
            end: Some(end),
        }
    }

    fn engine(
        extractive: Option<Arc<dyn QuestionAnswering>>,
        generative: Option<Arc<dyn TextGeneration>>,
        settings: QaSettings,
    ) -> QaEngine {
        QaEngine::with_token_counter(
            extractive,
            generative,
            Arc::new(ModelRegistry::new()),
            settings,
            whitespace_token_counter(),
        )
    }

    #[tokio::test]
    async fn keyword_answers_skip_the_models() {
        let qa = Arc::new(StubQa::serving(&["roberta"]));
        let engine = engine(Some(qa.clone()), None, settings());

        let answer = engine
            .answer("Что это за компания?", "KAZKOMP.KZ", None)
            .await;

        assert_eq!(answer.source, AnswerSource::Keyword);
        assert_eq!(answer.confidence, 0.7);
        assert!(qa.contexts.lock().expect("contexts lock").is_empty());
        assert!(engine.loaded_models().await.is_empty());
    }

    #[tokio::test]
    async fn best_scoring_window_wins() {
        let context = "word ".repeat(50);
        let qa = Arc::new(StubQa::serving(&["roberta"]).respond(vec![
            Ok(span("first", 0.2, 0, 5)),
            Ok(span("second", 0.9, 10, 16)),
            Ok(span("third", 0.4, 3, 8)),
        ]));
        let mut settings = settings();
        settings.max_windows = 3;
        let engine = engine(Some(qa.clone()), None, settings);

        let answer = engine.answer("Who signed?", &context, None).await;

        assert_eq!(answer.answer, "second");
        assert_eq!(answer.confidence, 0.9);
        assert_eq!((answer.start, answer.end), (10, 16));
        assert_eq!(answer.source, AnswerSource::Extractive);
        assert_eq!(answer.model.as_deref(), Some("roberta"));
        assert_eq!(qa.contexts.lock().expect("contexts lock").len(), 3);
    }

    #[tokio::test]
    async fn inverted_span_is_not_found() {
        let qa = Arc::new(StubQa::serving(&["roberta"]).respond(vec![Ok(span("x", 0.9, 7, 7))]));
        let engine = engine(Some(qa), None, settings());

        let answer = engine.answer("Who signed?", "short context", None).await;

        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn special_tokens_only_is_not_found() {
        let qa = Arc::new(
            StubQa::serving(&["roberta"]).respond(vec![Ok(span("<s> </s><pad>", 0.6, 0, 4))]),
        );
        let engine = engine(Some(qa), None, settings());

        let answer = engine.answer("Who signed?", "short context", None).await;

        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn model_error_becomes_canned_answer() {
        let qa = Arc::new(StubQa::serving(&["roberta"]).respond(vec![Err("boom".into())]));
        let engine = engine(Some(qa), None, settings());

        let answer = engine.answer("Who signed?", "short context", None).await;

        assert_eq!(answer.answer, QA_FAILURE_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert_eq!(answer.source, AnswerSource::Fallback);
    }

    #[tokio::test]
    async fn unloadable_chain_reports_load_failure() {
        let engine = engine(None, None, settings());

        let answer = engine.answer("Who signed?", "short context", None).await;

        assert_eq!(answer.answer, LOAD_FAILURE_ANSWER);
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert!(answer.model.is_none());
    }

    #[tokio::test]
    async fn generative_model_closes_the_chain() {
        let generator = Arc::new(StubGenerator::new(Ok("<echo>")));
        let engine = engine(None, Some(generator.clone()), settings());

        let answer = engine.answer("Who signed?", "Alice signed it", None).await;

        assert_eq!(answer.answer, "echoed answer");
        assert_eq!(answer.confidence, 0.8);
        assert_eq!(answer.source, AnswerSource::Generative);
        assert_eq!(answer.model.as_deref(), Some("llama"));

        let loaded = engine.loaded_models().await;
        assert_eq!(loaded[0].requested, "roberta");
        assert_eq!(loaded[0].resolved, "llama");

        let prompts = generator.prompts.lock().expect("prompts lock");
        assert_eq!(
            prompts[0],
            "Context: Alice signed it\nQuestion: Who signed?\nAnswer:"
        );
    }

    #[tokio::test]
    async fn empty_generation_is_not_found_with_half_confidence() {
        let generator = Arc::new(StubGenerator::new(Ok("  <pad> ")));
        let engine = engine(None, Some(generator), settings());

        let answer = engine.answer("Who signed?", "Alice signed it", None).await;

        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert_eq!(answer.confidence, 0.5);
    }

    #[tokio::test]
    async fn generative_error_becomes_canned_answer() {
        let generator = Arc::new(StubGenerator::new(Err("timeout")));
        let engine = engine(None, Some(generator), settings());

        let answer = engine.answer("Who signed?", "Alice signed it", None).await;

        assert_eq!(answer.answer, GENERATIVE_FAILURE_ANSWER);
        assert_eq!(answer.source, AnswerSource::Fallback);
    }

    #[tokio::test]
    async fn generative_prompt_respects_token_budget() {
        let generator = Arc::new(StubGenerator::new(Ok("fine")));
        let engine = engine(None, Some(generator.clone()), settings());
        let context = "filler ".repeat(100);

        engine.answer("Who signed?", &context, None).await;

        let prompts = generator.prompts.lock().expect("prompts lock");
        assert!(whitespace_token_counter().as_ref()(&prompts[0]) <= 20);
        assert!(prompts[0].ends_with("\nQuestion: Who signed?\nAnswer:"));
    }

    #[tokio::test]
    async fn requested_model_is_tried_first_and_cached_under_its_name() {
        let qa = Arc::new(
            StubQa::serving(&["custom/squad"]).respond(vec![Ok(span("Bob", 0.5, 0, 3))]),
        );
        let engine = engine(Some(qa), None, settings());

        let answer = engine
            .answer("Who signed?", "Bob signed", Some("custom/squad"))
            .await;

        assert_eq!(answer.model.as_deref(), Some("custom/squad"));
        let loaded = engine.loaded_models().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].requested, "custom/squad");
    }

    #[tokio::test]
    async fn context_is_cut_to_max_text_length_before_windowing() {
        let qa = Arc::new(StubQa::serving(&["roberta"]).respond(vec![Ok(span("one", 0.4, 0, 3))]));
        let mut settings = settings();
        settings.max_text_length = 9;
        let engine = engine(Some(qa.clone()), None, settings);

        engine
            .answer("Which number?", "one two three four five six", None)
            .await;

        let contexts = qa.contexts.lock().expect("contexts lock");
        assert_eq!(contexts.as_slice(), ["one two t"]);
    }

    #[test]
    fn char_truncation_is_utf8_safe() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
