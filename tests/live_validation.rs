use std::env;
use std::sync::Arc;

use visulex::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    models::{
        GenerationOptions, HfInferenceClient, InferenceBackend, OllamaClient, QuestionAnswering,
        TextGeneration,
    },
};

fn live_config() -> Config {
    dotenvy::dotenv().ok();
    Config::from_lookup(|key| env::var(key).ok()).expect("failed to load config from environment")
}

#[tokio::test]
#[ignore = "Requires a live Hugging Face inference endpoint"]
async fn live_extractive_qa_answers_from_context() {
    let config = live_config();
    let client = HfInferenceClient::new(&config).expect("inference client");
    let model = config.qa_models.first().expect("at least one QA model");

    client.ensure_model(model).await.expect("QA model loads");
    let prediction = client
        .answer_span(
            model,
            "Who signed the contract?",
            "The contract was signed by Alice Smith on Monday.",
        )
        .await
        .expect("QA prediction");
    assert!(
        prediction.answer.contains("Alice"),
        "unexpected answer: {prediction:?}"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama"]
async fn live_ollama_generation_roundtrip() {
    let config = live_config();
    let client = OllamaClient::new(&config).expect("ollama client");
    let model = config
        .generative_model
        .clone()
        .expect("GENERATIVE_MODEL must be set");

    client.ensure_model(&model).await.expect("model pulled");
    let text = client
        .generate(
            &model,
            "Context: The sky is blue.\nQuestion: What color is the sky?\nAnswer:",
            GenerationOptions::default(),
        )
        .await
        .expect("generation");
    assert!(!text.trim().is_empty(), "empty generation");
}

#[tokio::test]
#[ignore = "Requires a live embedding provider"]
async fn live_embedding_dimension_matches_config() {
    let config = live_config();
    let hf = (!config.hf_offline)
        .then(|| HfInferenceClient::new(&config).ok().map(Arc::new))
        .flatten();
    let ollama = OllamaClient::new(&config).ok().map(Arc::new);
    let client = get_embedding_client(&config, hf, ollama).expect("embedding provider configured");

    let vectors = client
        .generate_embeddings(vec!["visulex live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected one embedding per input");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}
