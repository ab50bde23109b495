//! Integration tests for the model session against a mock Ollama server.
//!
//! These tests drive the real `OllamaClient` over HTTP, so they cover the
//! wire format as well as the session lifecycle.

mod common;

use common::{MockOllama, ndjson};
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

use rubbersoul::backend::{
    DecodingParams, Endpoint, Message, ModelBackend, OllamaClient, Session, SessionState,
};
use rubbersoul::commit::{build_messages, build_prompt};
use rubbersoul::error::BackendError;

fn client_for(mock: &MockOllama) -> OllamaClient {
    OllamaClient::new(&mock.endpoint()).expect("Failed to build client")
}

fn sample_messages() -> Vec<Message> {
    build_messages(build_prompt("Describe:\n{diff}", "diff --git a/x b/x\n+foo"))
}

async fn collect_stream(session: &Session<OllamaClient>) -> Result<String, BackendError> {
    let mut stream = session
        .ask_stream(&sample_messages(), &DecodingParams::default())
        .await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(chunk?.as_str());
    }
    Ok(text)
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = Endpoint::new("127.0.0.1", port);
    let client = OllamaClient::new(&endpoint).unwrap();

    let err = Session::connect(client, &endpoint, "llama3")
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, BackendError::Unavailable { port: p, .. } if p == port));
    assert!(err.to_string().contains("ollama serve"));
}

#[tokio::test]
async fn test_missing_model_lists_available() {
    let mock = MockOllama::start().await;
    mock.with_models(&["mistral", "phi3"]).await;

    let err = Session::connect(client_for(&mock), &mock.endpoint(), "llama3")
        .await
        .err()
        .expect("connect should fail");

    let message = err.to_string();
    assert!(matches!(err, BackendError::ModelNotFound { .. }));
    assert!(message.contains("llama3"));
    assert!(message.contains("mistral"));
    assert!(message.contains("phi3"));
    assert_eq!(mock.chat_requests().await, 0);
}

#[tokio::test]
async fn test_empty_model_list_suggests_pull() {
    let mock = MockOllama::start().await;
    mock.with_models(&[]).await;

    let err = Session::connect(client_for(&mock), &mock.endpoint(), "llama3")
        .await
        .err()
        .expect("connect should fail");
    assert!(err.to_string().contains("ollama pull"));
}

#[tokio::test]
async fn test_list_models_prefers_model_field() {
    let mock = MockOllama::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/api/tags"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "Llama 3", "model": "llama3:latest"},
                {"name": "phi3"}
            ]
        })))
        .mount(&mock.server)
        .await;

    let models = assert_ok!(client_for(&mock).list_models().await);
    assert_eq!(models, vec!["llama3:latest", "phi3"]);
}

#[tokio::test]
async fn test_ask_returns_reply_and_closes_once() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    mock.with_reply("feat: add foo").await;
    mock.expect_unload(1).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    assert_eq!(session.state(), SessionState::Active);

    let text = assert_ok!(session.ask(&sample_messages(), &DecodingParams::default()).await);
    assert_eq!(text, "feat: add foo");

    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_request_carries_decoding_options() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/api/chat"))
        .and(wiremock::matchers::body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "keep_alive": "300s",
            "options": {
                "temperature": 0.1,
                "top_p": 0.5,
                "top_k": 20,
                "repeat_penalty": 1.3,
                "num_predict": 150
            },
            "messages": [{"role": "system"}, {"role": "user"}]
        })))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "fix: handle nil"},
            "done": true
        })))
        .expect(1)
        .mount(&mock.server)
        .await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let text = assert_ok!(session.ask(&sample_messages(), &DecodingParams::default()).await);
    assert_eq!(text, "fix: handle nil");
}

#[tokio::test]
async fn test_untagged_model_resolves_to_latest() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3:latest"]).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    assert_eq!(session.model(), "llama3:latest");
}

#[tokio::test]
async fn test_stream_yields_chunks_in_order() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    mock.with_stream(&["feat", "(x): ", "add foo"]).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let mut stream = assert_ok!(
        session
            .ask_stream(&sample_messages(), &DecodingParams::default())
            .await
    );

    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.push(assert_ok!(chunk).into_string());
    }
    assert_eq!(received, vec!["feat", "(x): ", "add foo"]);
    assert_eq!(received.concat(), "feat(x): add foo");
}

#[tokio::test]
async fn test_stream_concatenation_matches_single_reply() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    mock.with_reply("docs: explain the cache\n").await;
    mock.with_stream(&["docs", ": explain", " the cache", "\n"]).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let single = assert_ok!(session.ask(&sample_messages(), &DecodingParams::default()).await);
    let streamed = assert_ok!(collect_stream(&session).await);

    assert_eq!(streamed, single);
}

#[tokio::test]
async fn test_stream_split_across_reads_is_reassembled() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    // No trailing newline after the final object.
    let body = ndjson(&["chore: ", "bump deps"]);
    mock.with_stream_body(body.trim_end().to_string()).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    assert_eq!(assert_ok!(collect_stream(&session).await), "chore: bump deps");
}

#[tokio::test]
async fn test_reasoning_model_falls_back_to_thinking() {
    let mock = MockOllama::start().await;
    mock.with_models(&["qwen3"]).await;
    mock.with_reply_json(json!({
        "message": {"role": "assistant", "content": "", "thinking": "refactor: split parser"},
        "done": true
    }))
    .await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "qwen3").await);
    let text = assert_ok!(session.ask(&sample_messages(), &DecodingParams::default()).await);
    assert_eq!(text, "refactor: split parser");
}

#[tokio::test]
async fn test_error_fragment_mid_stream_fails_generation() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    let body = format!(
        "{}\n{}\n",
        json!({"message": {"role": "assistant", "content": "feat"}, "done": false}),
        json!({"error": "model runner crashed"})
    );
    mock.with_stream_body(body).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let err = assert_err!(collect_stream(&session).await);
    assert!(matches!(err, BackendError::Generation(ref m) if m.contains("model runner crashed")));
}

#[tokio::test]
async fn test_stream_without_done_is_an_error() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    let body = format!(
        "{}\n",
        json!({"message": {"role": "assistant", "content": "feat"}, "done": false})
    );
    mock.with_stream_body(body).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let err = assert_err!(collect_stream(&session).await);
    assert!(matches!(err, BackendError::Generation(_)));
}

#[tokio::test]
async fn test_http_error_is_generation_error() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    mock.with_chat_status(500, r#"{"error":"out of memory"}"#).await;
    mock.expect_unload(1).await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    let err = assert_err!(session.ask(&sample_messages(), &DecodingParams::default()).await);
    assert!(matches!(err, BackendError::Generation(_)));
    assert!(err.to_string().contains("out of memory"));

    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_close_reports_unload_failure() {
    let mock = MockOllama::start().await;
    mock.with_models(&["llama3"]).await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/api/chat"))
        .and(wiremock::matchers::body_partial_json(json!({"keep_alive": "0s"})))
        .respond_with(wiremock::ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&mock.server)
        .await;

    let session = assert_ok!(Session::connect(client_for(&mock), &mock.endpoint(), "llama3").await);
    assert_err!(session.close().await);
}
