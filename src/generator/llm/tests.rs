use super::*;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server_uri: &str) -> OllamaChatClient {
    let url = Url::parse(server_uri).expect("mock server URI should parse");
    let config = OllamaConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().expect("mock server has a host").to_string(),
        port: url.port().expect("mock server has a port"),
        embedding_model: "embed".to_string(),
        chat_model: "chat-model".to_string(),
    };
    OllamaChatClient::new(&config)
        .expect("should create client")
        .with_retry_delays(
            Duration::from_millis(5),
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "chat-model",
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "| Description | table |"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let result = tokio::task::spawn_blocking(move || {
        client.complete("You are a QA engineer.", "Generate a test case.")
    })
    .await
    .expect("task should join")
    .expect("completion should succeed");

    assert_eq!(result, "| Description | table |");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_retry_then_succeed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "recovered"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.complete("sys", "user"))
        .await
        .expect("task should join")
        .expect("completion should succeed after retries");

    assert_eq!(result, "recovered");
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "after rate limit"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.complete("sys", "user"))
        .await
        .expect("task should join")
        .expect("completion should succeed");

    assert_eq!(result, "after rate limit");
}

#[tokio::test(flavor = "multi_thread")]
async fn attempts_are_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server.uri()).with_max_attempts(2);
    let result = tokio::task::spawn_blocking(move || client.complete("sys", "user"))
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.complete("sys", "user"))
        .await
        .expect("task should join");

    assert!(result.is_err());
}
