//! Messages API adapter tests against a mock HTTP server.
//!
//! Covers plain completions for the oracle, streamed code generation,
//! partial code recovery when a stream breaks, and retry classification of
//! API errors.

use mockito::{Matcher, Server};
use std::sync::Arc;

use plancell::adapters::{AnthropicClient, AnthropicGenerator, AnthropicOracle, RetryingOracle};
use plancell::domain::errors::DomainError;
use plancell::domain::models::{LlmConfig, RetryConfig};
use plancell::domain::ports::{CodeGenerator, GenerationRequest, Oracle};

fn client_for(server: &Server) -> Arc<AnthropicClient> {
    let config = LlmConfig {
        base_url: server.url(),
        api_key: Some("test-api-key".to_string()),
        timeout_secs: 5,
        ..LlmConfig::default()
    };
    Arc::new(AnthropicClient::new(config).expect("client"))
}

fn fast_retries(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

fn generation_request() -> GenerationRequest {
    GenerationRequest {
        step_description: "Load the data".to_string(),
        original_question: "Which cell populations are present?".to_string(),
        step_index: 0,
        total_steps: 4,
        datasets: vec![],
        implementation_hint: None,
    }
}

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|event| {
            format!(
                "event: {}\ndata: {}\n\n",
                event["type"].as_str().unwrap_or("message"),
                event
            )
        })
        .collect()
}

fn delta(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": { "type": "text_delta", "text": text }
    })
}

#[tokio::test]
async fn test_oracle_returns_completion_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-api-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(serde_json::json!({ "max_tokens": 4096 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "text", "text": "SKIP: normalization already ran" }],
                "stop_reason": "end_turn"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let oracle = AnthropicOracle::new(client_for(&server));
    let answer = oracle
        .ask("Skip or run?", "Step under review: Normalize again")
        .await
        .unwrap();

    assert_eq!(answer, "SKIP: normalization already ran");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(401)
        .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
        .expect(1)
        .create_async()
        .await;

    let oracle = RetryingOracle::new(
        Arc::new(AnthropicOracle::new(client_for(&server))),
        fast_retries(3),
    );
    let err = oracle.ask("q", "c").await.unwrap_err();

    match err {
        DomainError::OracleFailed(message) => assert!(message.starts_with("API error 401")),
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_retried_until_budget_is_spent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(529)
        .with_body(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
        .expect(3)
        .create_async()
        .await;

    let oracle = RetryingOracle::new(
        Arc::new(AnthropicOracle::new(client_for(&server))),
        fast_retries(2),
    );
    assert!(oracle.ask("q", "c").await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_generator_streams_fenced_code() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        serde_json::json!({ "type": "message_start", "message": { "id": "msg_02" } }),
        delta("Here is the code:\n```python\n"),
        delta("import scanpy as sc\nadata = sc.read_h5ad(\"pbmc.h5ad\")\n"),
        delta("```\n"),
        serde_json::json!({ "type": "message_stop" }),
    ]);
    let mock = server
        .mock("POST", "/v1/messages")
        .match_body(Matcher::PartialJson(serde_json::json!({ "stream": true })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let generator = AnthropicGenerator::new(client_for(&server));
    let generated = generator.generate(&generation_request()).await.unwrap();

    assert_eq!(
        generated.code,
        "import scanpy as sc\nadata = sc.read_h5ad(\"pbmc.h5ad\")"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_error_keeps_partial_code() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        delta("```python\nimport scanpy as sc\n"),
        delta("adata = sc.read_h5ad(\"pbmc.h5ad\")\n"),
        serde_json::json!({
            "type": "error",
            "error": { "type": "overloaded_error", "message": "Overloaded" }
        }),
    ]);
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let generator = AnthropicGenerator::new(client_for(&server));
    let err = generator.generate(&generation_request()).await.unwrap_err();

    assert!(matches!(err, DomainError::GenerationFailed { .. }));
    assert!(err.to_string().contains("Overloaded"));
    assert_eq!(
        err.partial_code(),
        Some("import scanpy as sc\nadata = sc.read_h5ad(\"pbmc.h5ad\")")
    );
}

#[tokio::test]
async fn test_stream_error_without_text_has_no_partial_code() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let generator = AnthropicGenerator::new(client_for(&server));
    let err = generator
        .regenerate("boom()", "NameError: boom", "Cluster the cells")
        .await
        .unwrap_err();

    assert!(err.partial_code().is_none());
}

#[test]
fn test_missing_api_key_is_reported() {
    let config = LlmConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: None,
        ..LlmConfig::default()
    };
    let oracle = AnthropicOracle::new(Arc::new(AnthropicClient::new(config).unwrap()));

    let result = temp_env::with_var_unset("ANTHROPIC_API_KEY", || {
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(oracle.ask("q", "c"))
    });

    assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
}
