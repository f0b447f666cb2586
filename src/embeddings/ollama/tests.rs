use super::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server_uri: &str) -> OllamaClient {
    let url = Url::parse(server_uri).expect("mock server URI should parse");
    let config = OllamaConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().expect("mock server has a host").to_string(),
        port: url.port().expect("mock server has a port"),
        embedding_model: "test-model".to_string(),
        chat_model: "test-chat".to_string(),
    };
    OllamaClient::new(&config).expect("should create client")
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-model".to_string(),
        chat_model: "test-chat".to_string(),
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_embedding_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let texts = vec!["first text".to_string(), "second text".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should join")
        .expect("embedding should succeed");

    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[0], vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_text_uses_single_embedding_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": [0.5, 0.5]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let texts = vec!["only one".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should join")
        .expect("embedding should succeed");

    assert_eq!(embeddings, vec![vec![0.5, 0.5]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let texts = vec!["one".to_string(), "two".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    // First two attempts fail, third succeeds
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0], [2.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let texts = vec!["a".to_string(), "b".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should join")
        .expect("embedding should eventually succeed");

    assert_eq!(embeddings.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_fail_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn list_models_parses_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                {"name": "test-model", "size": 123, "digest": "abc"},
                {"name": "other-model"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let models = tokio::task::spawn_blocking(move || client.list_models())
        .await
        .expect("task should join")
        .expect("list_models should succeed");

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "test-model");

    let client = client_for(&server.uri());
    tokio::task::spawn_blocking(move || client.validate_model())
        .await
        .expect("task should join")
        .expect("configured model should validate");
}
