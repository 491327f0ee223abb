//! OpenAI-compatible provider tests against a `wiremock` server
//!
//! SSE bodies are served with `set_body_raw(bytes, "text/event-stream")` so
//! the content type matches what real endpoints send.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatstream::chat::{Message, ModelSpec, Role, Session, SessionConfig};
use chatstream::completion::CompletionInput;
use chatstream::config::{CompletionConfig, ProviderConfig};
use chatstream::error::{as_chat_error, ChatStreamError};
use chatstream::providers::{CompletionRequest, OpenAiProvider, Provider};
use chatstream::storage::{InMemorySessionStore, SessionGateway};
use chatstream::tokenizer::WordCounter;
use tokio_util::sync::CancellationToken;

use common::{drain, engine};

fn sse(chunks: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(chunk);
        body.push_str("\n\n");
    }
    body.into_bytes()
}

fn delta(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
    .to_string()
}

fn provider_for(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(ProviderConfig {
        api_base: format!("{}/v1", server.uri()),
        api_key: Some("sk-test".to_string()),
        connect_timeout_seconds: 5,
    })
    .expect("provider should build")
}

fn request() -> CompletionRequest {
    let system = Message::create(Role::System, "be brief", "gpt-test", &WordCounter).unwrap();
    let session =
        Session::create("alice", system, SessionConfig::new(ModelSpec::new("gpt-test", 100)))
            .unwrap();
    CompletionRequest::from_session(&session)
}

#[tokio::test]
async fn test_streams_deltas_in_order() {
    let server = MockServer::start().await;
    let role_only = serde_json::json!({
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
    })
    .to_string();
    let body = sse(&[&role_only, &delta("Hel"), &delta("lo"), "[DONE]"]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider.stream_completion(request()).await.unwrap();

    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.expect("delta should parse").content);
    }
    assert_eq!(fragments, vec!["", "Hel", "lo"]);

    let received = server.received_requests().await.expect("recording enabled");
    let sent: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent["stream"], serde_json::json!(true));
    assert_eq!(sent["model"], "gpt-test");
    assert_eq!(sent["messages"][0]["role"], "system");
}

#[tokio::test]
async fn test_error_status_is_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = match provider.stream_completion(request()).await {
        Ok(_) => panic!("429 should fail the request"),
        Err(e) => e,
    };

    match as_chat_error(&err) {
        Some(ChatStreamError::ProviderRequest(message)) => {
            assert!(message.contains("429"));
            assert!(message.contains("rate limited"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_frame_ends_stream_with_error() {
    let server = MockServer::start().await;
    let error_frame = serde_json::json!({"error": {"message": "model overloaded"}}).to_string();
    let body = sse(&[&delta("par"), &error_frame, &delta("never")]);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider.stream_completion(request()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content, "par");

    let second = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(
        as_chat_error(&second),
        Some(ChatStreamError::Streaming(m)) if m == "model overloaded"
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_orchestrator_against_http_provider() {
    let server = MockServer::start().await;
    let body = sse(&[&delta("Hel"), &delta("lo"), "[DONE]"]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let store = Arc::new(InMemorySessionStore::new());
    let (engine, mut rx) = engine(store.clone(), Arc::new(provider_for(&server)), 8);

    let config = CompletionConfig {
        model: "gpt-test".to_string(),
        ..CompletionConfig::default()
    };
    let output = engine
        .execute(
            CompletionInput::new("http-chat", "alice", "say hello").with_config(config),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.content, "Hello");
    let contents: Vec<String> = drain(&mut rx).into_iter().map(|s| s.content).collect();
    assert_eq!(contents, vec!["Hel".to_string(), "Hello".to_string()]);

    let stored = store.find_by_id("http-chat").await.unwrap().unwrap();
    assert_eq!(stored.messages().last().unwrap().content(), "Hello");
}
