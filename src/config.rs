use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the VisuLex server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Origins allowed to call the API from a browser.
    pub cors_allowed_origins: Vec<String>,
    /// Largest accepted upload, in bytes.
    pub max_file_size: usize,
    /// Maximum number of characters of document text handed to the QA cascade.
    pub max_text_length: usize,
    /// Summary length budget.
    pub summary_max_length: usize,
    /// Minimum summary length requested from summarization models.
    pub summary_min_length: usize,
    /// Base URL of the Hugging Face compatible inference endpoint.
    pub hf_inference_url: String,
    /// Optional bearer token for the inference endpoint.
    pub hf_api_token: Option<String>,
    /// Disable every Hugging Face backed model when set.
    pub hf_offline: bool,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Extractive question-answering models, tried in order.
    pub qa_models: Vec<String>,
    /// Generative model used as the final QA fallback.
    pub generative_model: Option<String>,
    /// Image-to-text models, tried in order.
    pub ocr_models: Vec<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional abstractive summarization backend.
    pub summarization_provider: SummarizationProvider,
    /// Summarization model identifier passed to the provider.
    pub summarization_model: String,
    /// Token budget for a single QA context window.
    pub qa_max_tokens: usize,
    /// Token overlap between consecutive QA windows.
    pub qa_stride: usize,
    /// Upper bound on QA windows evaluated for one question.
    pub qa_max_windows: usize,
    /// Timeout applied to every model request.
    pub request_timeout_secs: u64,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hugging Face feature-extraction pipeline.
    HuggingFace,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hash encoder, no model involved.
    Hashed,
}

/// Supported abstractive summarization backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationProvider {
    /// Extractive summaries only.
    None,
    /// Hugging Face summarization pipeline.
    HuggingFace,
    /// Local Ollama runtime prompted for a summary.
    Ollama,
}

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
const DEFAULT_HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QA_MODELS: &str =
    "deepset/roberta-base-squad2,distilbert-base-cased-distilled-squad";
const DEFAULT_GENERATIVE_MODEL: &str = "llama3.2";
const DEFAULT_OCR_MODELS: &str = "microsoft/trocr-base-printed,microsoft/trocr-base-handwritten,Salesforce/blip-image-captioning-base";
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_SUMMARIZATION_MODEL: &str = "facebook/bart-large-cnn";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset so that `.env` templates with empty entries fall back
    /// to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            server_port: get("SERVER_PORT")
                .map(|value| parse_value("SERVER_PORT", &value))
                .transpose()?,
            cors_allowed_origins: split_list(
                &get("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
            ),
            max_file_size: parse_or(&get, "MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            max_text_length: parse_or(&get, "MAX_TEXT_LENGTH", 10_000)?,
            summary_max_length: parse_or(&get, "SUMMARY_MAX_LENGTH", 150)?,
            summary_min_length: parse_or(&get, "SUMMARY_MIN_LENGTH", 30)?,
            hf_inference_url: get("HF_INFERENCE_URL")
                .unwrap_or_else(|| DEFAULT_HF_INFERENCE_URL.to_string()),
            hf_api_token: get("HF_API_TOKEN"),
            hf_offline: get("HF_OFFLINE")
                .map(|value| parse_bool("HF_OFFLINE", &value))
                .transpose()?
                .unwrap_or(false),
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            qa_models: split_list(
                &get("QA_MODELS").unwrap_or_else(|| DEFAULT_QA_MODELS.to_string()),
            ),
            generative_model: match lookup("GENERATIVE_MODEL") {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(value.trim().to_string()),
                None => Some(DEFAULT_GENERATIVE_MODEL.to_string()),
            },
            ocr_models: split_list(
                &get("OCR_MODELS").unwrap_or_else(|| DEFAULT_OCR_MODELS.to_string()),
            ),
            embedding_provider: get("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::HuggingFace),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_or(&get, "EMBEDDING_DIMENSION", 384)?,
            summarization_provider: get("SUMMARIZATION_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(SummarizationProvider::None),
            summarization_model: get("SUMMARIZATION_MODEL")
                .unwrap_or_else(|| DEFAULT_SUMMARIZATION_MODEL.to_string()),
            qa_max_tokens: parse_or(&get, "QA_MAX_TOKENS", 512)?,
            qa_stride: parse_or(&get, "QA_STRIDE", 128)?,
            qa_max_windows: parse_or(&get, "QA_MAX_WINDOWS", 8)?,
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", 60)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidValue("MAX_FILE_SIZE".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.qa_max_tokens == 0 {
            return Err(ConfigError::InvalidValue("QA_MAX_TOKENS".into()));
        }
        if self.qa_stride >= self.qa_max_tokens {
            return Err(ConfigError::InvalidValue("QA_STRIDE".into()));
        }
        if self.qa_max_windows == 0 {
            return Err(ConfigError::InvalidValue("QA_MAX_WINDOWS".into()));
        }
        // CORS is sent with credentials, which browsers refuse for a wildcard origin.
        if self.cors_allowed_origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::InvalidValue("CORS_ALLOWED_ORIGINS".into()));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" => Ok(Self::Ollama),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

impl EmbeddingProvider {
    /// Name accepted by `EMBEDDING_PROVIDER`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::Ollama => "ollama",
            Self::Hashed => "hashed",
        }
    }
}

impl std::str::FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "extractive" => Ok(Self::None),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        server_port = ?config.server_port,
        hf_inference_url = %config.hf_inference_url,
        hf_offline = config.hf_offline,
        ollama_url = %config.ollama_url,
        embedding_provider = ?config.embedding_provider,
        summarization_provider = ?config.summarization_provider,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_cover_every_setting() {
        let config = config_from(&[]).expect("defaults");
        assert_eq!(config.server_port, None);
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.max_text_length, 10_000);
        assert_eq!(config.summary_max_length, 150);
        assert_eq!(config.qa_models.len(), 2);
        assert_eq!(config.qa_models[0], "deepset/roberta-base-squad2");
        assert_eq!(config.generative_model.as_deref(), Some("llama3.2"));
        assert_eq!(config.ocr_models.len(), 3);
        assert_eq!(config.embedding_provider, EmbeddingProvider::HuggingFace);
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.summarization_provider, SummarizationProvider::None);
        assert!(!config.hf_offline);
    }

    #[test]
    fn overrides_are_parsed_and_trimmed() {
        let config = config_from(&[
            ("SERVER_PORT", "9000"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test ,"),
            ("QA_MODELS", " model-a ,model-b"),
            ("EMBEDDING_PROVIDER", "Ollama"),
            ("SUMMARIZATION_PROVIDER", "hf"),
            ("HF_OFFLINE", "yes"),
            ("HF_API_TOKEN", "secret"),
        ])
        .expect("config");
        assert_eq!(config.server_port, Some(9000));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test", "http://b.test"]
        );
        assert_eq!(config.qa_models, vec!["model-a", "model-b"]);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(
            config.summarization_provider,
            SummarizationProvider::HuggingFace
        );
        assert!(config.hf_offline);
        assert_eq!(config.hf_api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_generative_model_disables_the_fallback() {
        let config = config_from(&[("GENERATIVE_MODEL", "  ")]).expect("config");
        assert!(config.generative_model.is_none());
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let error = config_from(&[("MAX_FILE_SIZE", "50 * 1024 * 1024")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "MAX_FILE_SIZE"));
    }

    #[test]
    fn stride_must_be_smaller_than_window() {
        let error = config_from(&[("QA_MAX_TOKENS", "128"), ("QA_STRIDE", "128")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "QA_STRIDE"));
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        let error =
            config_from(&[("CORS_ALLOWED_ORIGINS", "http://a.test, *")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CORS_ALLOWED_ORIGINS"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let error = config_from(&[("EMBEDDING_PROVIDER", "openai")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "EMBEDDING_PROVIDER"));
    }
}
