#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client behaviour against a mocked Ollama HTTP API

use pdf_rag::RagError;
use pdf_rag::config::{EmbeddingConfig, GenerationConfig, OllamaConfig};
use pdf_rag::embeddings::{Embedder, OllamaClient, OllamaEmbedder};
use pdf_rag::generation::{Generator, OllamaGenerator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMBED_MODEL: &str = "all-minilm:latest";

fn client_for(server: &MockServer, retry_attempts: u32) -> OllamaClient {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        retry_attempts,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("should create client")
        .with_backoff(Duration::from_millis(5))
}

fn embedding_config(dimension: u32) -> EmbeddingConfig {
    EmbeddingConfig {
        model: EMBED_MODEL.to_string(),
        dimension,
        document_prefix: "search_document: ".to_string(),
        query_prefix: "search_query: ".to_string(),
        ..EmbeddingConfig::default()
    }
}

async fn mount_tags(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "all-minilm:latest", "size": 45_960_996, "digest": "1b226e2802db"},
                {"name": "llama3.2:latest"}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_check_accepts_untagged_model_names() {
    let server = MockServer::start().await;
    mount_tags(&server).await;
    let client = client_for(&server, 1);

    let result = tokio::task::spawn_blocking(move || {
        (
            client.health_check("llama3.2").map_err(|e| format!("{:#}", e)),
            client.health_check("all-minilm:latest").map_err(|e| format!("{:#}", e)),
            client.validate_model("mistral").map_err(|e| format!("{:#}", e)),
        )
    })
    .await
    .expect("task should not panic");

    assert!(result.0.is_ok(), "{:?}", result.0);
    assert!(result.1.is_ok(), "{:?}", result.1);
    let missing = result.2.expect_err("mistral is not pulled");
    assert!(missing.contains("not available"), "{}", missing);
}

#[tokio::test]
async fn list_models_reads_tags() {
    let server = MockServer::start().await;
    mount_tags(&server).await;
    let client = client_for(&server, 1);

    let models = tokio::task::spawn_blocking(move || client.list_models())
        .await
        .expect("task should not panic")
        .expect("should list models");

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "all-minilm:latest");
    assert_eq!(models[0].size, Some(45_960_996));
    assert_eq!(models[1].digest, None);
}

#[tokio::test]
async fn embed_sends_the_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": EMBED_MODEL,
            "input": ["first chunk", "second chunk"],
            "truncate": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": EMBED_MODEL,
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, 1);

    let vectors = tokio::task::spawn_blocking(move || {
        client.embed(
            EMBED_MODEL,
            &["first chunk".to_string(), "second chunk".to_string()],
        )
    })
    .await
    .expect("task should not panic")
    .expect("should embed");

    assert_eq!(vectors, vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "model \"all-minilm:latest\" not found, try pulling it first"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, 3);

    let err = tokio::task::spawn_blocking(move || client.embed(EMBED_MODEL, &["x".to_string()]))
        .await
        .expect("task should not panic")
        .expect_err("should fail");

    assert!(format!("{:#}", err).contains("Client error: HTTP 404"), "{:#}", err);
}

#[tokio::test]
async fn server_errors_are_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let client = client_for(&server, 3);

    let result =
        tokio::task::spawn_blocking(move || client.generate("llama3.2", "Say hello", 0.7))
            .await
            .expect("task should not panic");

    assert!(result.is_err());
}

#[tokio::test]
async fn transient_failures_recover() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "response": "Hello!",
            "done": true
        })))
        .mount(&server)
        .await;
    let client = client_for(&server, 2);

    let text = tokio::task::spawn_blocking(move || client.generate("llama3.2", "Say hello", 0.7))
        .await
        .expect("task should not panic")
        .expect("second attempt should succeed");

    assert_eq!(text, "Hello!");
}

#[tokio::test]
async fn embedder_applies_document_and_query_prefixes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "input": ["search_document: The capital of France is Paris."]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "input": ["search_query: capital of France"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(
        Arc::new(client_for(&server, 1)),
        &embedding_config(3),
        Duration::from_secs(5),
    );
    assert_eq!(embedder.model_id(), EMBED_MODEL);
    assert_eq!(embedder.dimension(), 3);

    let documents = embedder
        .embed(&["The capital of France is Paris.".to_string()])
        .await
        .expect("should embed documents");
    assert_eq!(documents, vec![vec![1.0, 0.0, 0.0]]);

    let query = embedder
        .embed_query("capital of France")
        .await
        .expect("should embed query");
    assert_eq!(query, vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn embedder_rejects_vectors_of_the_wrong_length() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.5, 0.5]]
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(
        Arc::new(client_for(&server, 1)),
        &embedding_config(3),
        Duration::from_secs(5),
    );

    let err = embedder
        .embed_query("anything")
        .await
        .expect_err("dimension should not match");
    assert!(matches!(err, RagError::EmbeddingFailure(_)), "{:?}", err);
}

#[tokio::test]
async fn embedder_never_lets_ollama_truncate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"truncate": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(
        Arc::new(client_for(&server, 1)),
        &embedding_config(3),
        Duration::from_secs(5),
    );

    embedder
        .embed(&["a chunk of a lecture".to_string()])
        .await
        .expect("document request should disable truncation");
    embedder
        .embed_query("a question")
        .await
        .expect("query request should disable truncation");
}

#[tokio::test]
async fn input_over_the_context_length_is_an_embedding_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "the input length exceeds the context length"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(
        Arc::new(client_for(&server, 3)),
        &embedding_config(3),
        Duration::from_secs(5),
    );

    let err = embedder
        .embed(&["a very long chunk".repeat(1000)])
        .await
        .expect_err("oversized input should fail");
    match err {
        RagError::EmbeddingFailure(message) => {
            assert!(message.contains("Client error: HTTP 400"), "{}", message);
        }
        other => panic!("expected an embedding failure, got {:?}", other),
    }
}

#[tokio::test]
async fn slow_embeddings_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0, 0.0]]}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(
        Arc::new(client_for(&server, 1)),
        &embedding_config(3),
        Duration::from_millis(200),
    );

    let err = embedder
        .embed_query("anything")
        .await
        .expect_err("should time out");
    assert!(err.to_string().contains("timed out"), "{}", err);
}

#[tokio::test]
async fn generator_sends_model_and_temperature() {
    let server = MockServer::start().await;
    mount_tags(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "prompt": "Context: Paris\n\nQuestion: capital?",
            "stream": false,
            "options": {"temperature": 0.5}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "response": "Paris.",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = GenerationConfig {
        temperature: 0.5,
        ..GenerationConfig::default()
    };
    let generator = OllamaGenerator::new(
        Arc::new(client_for(&server, 1)),
        &config,
        Duration::from_secs(5),
    );

    generator.health_check().await.expect("model is pulled");
    let text = generator
        .generate("Context: Paris\n\nQuestion: capital?")
        .await
        .expect("should generate");
    assert_eq!(text, "Paris.");
}

#[tokio::test]
async fn generator_reports_missing_model() {
    let server = MockServer::start().await;
    mount_tags(&server).await;

    let config = GenerationConfig {
        model: "mistral".to_string(),
        ..GenerationConfig::default()
    };
    let generator = OllamaGenerator::new(
        Arc::new(client_for(&server, 1)),
        &config,
        Duration::from_secs(5),
    );

    let err = generator.health_check().await.expect_err("model is missing");
    assert!(matches!(err, RagError::GenerationFailure(_)), "{:?}", err);
}
