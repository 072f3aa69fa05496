//! Process-wide cache of loaded models with fallback-chain resolution.

use crate::models::types::{LoadedModel, ModelError, ModelSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Strategy used by the registry to load a single candidate.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load `spec`, returning an error when the backend cannot serve it.
    async fn load(&self, spec: &ModelSpec) -> Result<(), ModelError>;
}

/// Cache of models resolved from fallback chains, keyed by the requested model name.
///
/// Entries live for the lifetime of the process; nothing is evicted.
#[derive(Default)]
pub struct ModelRegistry {
    cache: RwLock<HashMap<String, LoadedModel>>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `key`, if one has been loaded.
    pub async fn cached(&self, key: &str) -> Option<LoadedModel> {
        self.cache.read().await.get(key).cloned()
    }

    /// Resolve `key` to a loaded model, trying `candidates` in order on a cache miss.
    ///
    /// The first candidate that loads is cached under `key`. Failed candidates are logged and
    /// skipped. Concurrent misses for the same key may both probe the backend; the first writer
    /// wins and later results are discarded.
    pub async fn load_first<L>(
        &self,
        key: &str,
        candidates: &[ModelSpec],
        loader: &L,
    ) -> Result<LoadedModel, ModelError>
    where
        L: ModelLoader + ?Sized,
    {
        if let Some(model) = self.cached(key).await {
            return Ok(model);
        }

        tracing::info!(model = key, "Loading model");
        for spec in candidates {
            match loader.load(spec).await {
                Ok(()) => {
                    let loaded = LoadedModel {
                        requested: key.to_string(),
                        resolved: spec.name.clone(),
                        kind: spec.kind,
                    };
                    let mut guard = self.cache.write().await;
                    let entry = guard.entry(key.to_string()).or_insert(loaded);
                    tracing::info!(
                        model = key,
                        resolved = %entry.resolved,
                        kind = ?entry.kind,
                        "Model loaded"
                    );
                    return Ok(entry.clone());
                }
                Err(error) => {
                    tracing::warn!(
                        model = %spec.name,
                        kind = ?spec.kind,
                        error = %error,
                        "Failed to load model; trying next candidate"
                    );
                }
            }
        }

        let candidates = candidates
            .iter()
            .map(|spec| spec.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::error!(model = key, candidates = %candidates, "No model in the chain loaded");
        Err(ModelError::NoModelLoaded { candidates })
    }

    /// Snapshot of every cached model, sorted by key.
    pub async fn loaded(&self) -> Vec<LoadedModel> {
        let guard = self.cache.read().await;
        let mut models: Vec<LoadedModel> = guard.values().cloned().collect();
        models.sort_by(|left, right| left.requested.cmp(&right.requested));
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::ModelKind;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct StubLoader {
        available: HashSet<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl StubLoader {
        fn new(available: &[&str]) -> Self {
            Self {
                available: available.iter().map(|name| name.to_string()).collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().expect("attempts lock").clone()
        }
    }

    #[async_trait]
    impl ModelLoader for StubLoader {
        async fn load(&self, spec: &ModelSpec) -> Result<(), ModelError> {
            self.attempts
                .lock()
                .expect("attempts lock")
                .push(spec.name.clone());
            if self.available.contains(&spec.name) {
                Ok(())
            } else {
                Err(ModelError::Unavailable {
                    model: spec.name.clone(),
                    reason: "not installed".into(),
                })
            }
        }
    }

    fn chain() -> Vec<ModelSpec> {
        vec![
            ModelSpec::extractive("roberta"),
            ModelSpec::extractive("distilbert"),
            ModelSpec::generative("llama"),
        ]
    }

    #[tokio::test]
    async fn falls_through_to_first_available_candidate() {
        let registry = ModelRegistry::new();
        let loader = StubLoader::new(&["distilbert", "llama"]);

        let loaded = registry
            .load_first("roberta", &chain(), &loader)
            .await
            .expect("model loaded");

        assert_eq!(loaded.requested, "roberta");
        assert_eq!(loaded.resolved, "distilbert");
        assert_eq!(loaded.kind, ModelKind::Extractive);
        assert_eq!(loader.attempts(), vec!["roberta", "distilbert"]);
    }

    #[tokio::test]
    async fn generative_model_closes_the_chain() {
        let registry = ModelRegistry::new();
        let loader = StubLoader::new(&["llama"]);

        let loaded = registry
            .load_first("roberta", &chain(), &loader)
            .await
            .expect("model loaded");

        assert_eq!(loaded.resolved, "llama");
        assert_eq!(loaded.kind, ModelKind::Generative);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_loader() {
        let registry = ModelRegistry::new();
        let loader = StubLoader::new(&["roberta"]);

        registry
            .load_first("roberta", &chain(), &loader)
            .await
            .expect("first load");
        registry
            .load_first("roberta", &chain(), &loader)
            .await
            .expect("cached load");

        assert_eq!(loader.attempts(), vec!["roberta"]);
        assert_eq!(registry.loaded().await.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_candidate() {
        let registry = ModelRegistry::new();
        let loader = StubLoader::new(&[]);

        let error = registry
            .load_first("roberta", &chain(), &loader)
            .await
            .expect_err("no model loads");

        match error {
            ModelError::NoModelLoaded { candidates } => {
                assert_eq!(candidates, "roberta, distilbert, llama");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(registry.cached("roberta").await.is_none());
    }
}
