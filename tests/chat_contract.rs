//! Chat service contract tests.
//!
//! These verify the HTTP shape of requests sent by `AzureOpenAiClient` and
//! the parsing of streamed responses served by a mock server.

use avatar_chat::chat::client::{AzureOpenAiClient, ChatBackend, ChatRequest};
use avatar_chat::chat::delta::Delta;
use avatar_chat::chat::message::{Message, Role};
use avatar_chat::config::{ChatConfig, RetrievalConfig};
use avatar_chat::error::AvatarError;
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLAIN_PATH: &str = "/openai/deployments/gpt-4o/chat/completions";
const RETRIEVAL_PATH: &str = "/openai/deployments/gpt-4o/extensions/chat/completions";

fn client(server: &MockServer) -> AzureOpenAiClient {
    AzureOpenAiClient::new(ChatConfig {
        endpoint: server.uri(),
        deployment: "gpt-4o".into(),
        api_key: "test-key".into(),
        ..ChatConfig::default()
    })
}

fn plain_request(text: &str) -> ChatRequest {
    ChatRequest {
        system_prompt: Some("Be brief.".into()),
        messages: vec![Message::user(text)],
        retrieval: None,
    }
}

fn sse(blocks: &[serde_json::Value]) -> String {
    let mut body: String = blocks.iter().map(|b| format!("data: {b}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn collect_ok(client: &AzureOpenAiClient, request: &ChatRequest) -> Vec<Delta> {
    let stream = match client.stream_reply(request).await {
        Ok(stream) => stream,
        Err(e) => panic!("request failed: {e}"),
    };
    stream
        .filter_map(|item| async move { item.ok() })
        .collect()
        .await
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .and(query_param("api-version", "2023-06-01-preview"))
        .and(header("api-key", "test-key"))
        .and(body_partial_json(json!({
            "stream": true,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(sse_response(sse(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let deltas = collect_ok(&client(&server), &plain_request("Hello")).await;
    assert_eq!(deltas.len(), 1);
    assert!(deltas[0].is_terminal);
}

#[tokio::test]
async fn retrieval_request_uses_extensions_route_and_data_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RETRIEVAL_PATH))
        .and(body_partial_json(json!({
            "stream": true,
            "dataSources": [{
                "type": "AzureCognitiveSearch",
                "parameters": {
                    "endpoint": "https://search.example.net",
                    "indexName": "docs",
                    "inScope": true,
                    "roleInformation": "Answer from the docs."
                }
            }]
        })))
        .respond_with(sse_response(sse(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest {
        system_prompt: Some("Answer from the docs.".into()),
        messages: vec![Message::user("Where?")],
        retrieval: Some(RetrievalConfig {
            endpoint: "https://search.example.net".into(),
            key: "search-key".into(),
            index_name: "docs".into(),
        }),
    };
    let deltas = collect_ok(&client(&server), &request).await;
    assert!(deltas.last().is_some_and(|d| d.is_terminal));
}

#[tokio::test]
async fn multimodal_user_message_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "system"},
                {"role": "user", "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "https://x/cat.png"}}
                ]}
            ]
        })))
        .respond_with(sse_response(sse(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest {
        system_prompt: Some("Be brief.".into()),
        messages: vec![Message::user_with_image("What is this?", "https://x/cat.png")],
        retrieval: None,
    };
    collect_ok(&client(&server), &request).await;
}

// ────────────────────────────────────────────────────────────────────────────
// Response parsing
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_stream_is_parsed_in_order() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"delta": {"role": "assistant"}}]}),
        json!({"choices": [{"delta": {"content": "Hello"}}]}),
        json!({"choices": [{"delta": {"content": ", world!"}}]}),
    ]);
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let deltas = collect_ok(&client(&server), &plain_request("Hi")).await;
    assert_eq!(deltas.len(), 4);
    assert_eq!(deltas[0].role, Some(Role::Assistant));
    let text: String = deltas.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(text, "Hello, world!");
    assert!(deltas[3].is_terminal);
}

#[tokio::test]
async fn retrieval_stream_carries_tool_role() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"messages": [{"delta": {"role": "tool", "content": "doc1 text"}}]}]}),
        json!({"choices": [{"messages": [{"delta": {"role": "assistant"}}]}]}),
        json!({"choices": [{"messages": [{"delta": {"content": "See above."}}]}]}),
    ]);
    Mock::given(method("POST"))
        .and(path(RETRIEVAL_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let request = ChatRequest {
        system_prompt: None,
        messages: vec![Message::user("Where?")],
        retrieval: Some(RetrievalConfig {
            endpoint: "https://search.example.net".into(),
            key: "k".into(),
            index_name: "docs".into(),
        }),
    };
    let deltas = collect_ok(&client(&server), &request).await;
    assert_eq!(deltas[0].role, Some(Role::Tool));
    assert_eq!(deltas[0].text, "doc1 text");
    assert_eq!(deltas[2].text, "See above.");
}

#[tokio::test]
async fn malformed_block_is_reported_and_skipped() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {{broken\n\ndata: {}\n\ndata: [DONE]\n\n",
        json!({"choices": [{"delta": {"content": "a"}}]}),
        json!({"choices": [{"delta": {"content": "b"}}]}),
    );
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let stream = match client(&server).stream_reply(&plain_request("Hi")).await {
        Ok(stream) => stream,
        Err(e) => panic!("request failed: {e}"),
    };
    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 4);
    assert!(matches!(&items[1], Err(AvatarError::Protocol(_))));
    assert!(matches!(&items[2], Ok(d) if d.text == "b"));
}

// ────────────────────────────────────────────────────────────────────────────
// Error mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "401", "message": "Access denied due to invalid subscription key."}
        })))
        .mount(&server)
        .await;

    let result = client(&server).stream_reply(&plain_request("Hi")).await;
    match result {
        Err(AvatarError::Auth(message)) => assert!(message.contains("invalid subscription key")),
        Err(other) => panic!("expected auth error, got {other}"),
        Ok(_) => panic!("expected auth error, got a stream"),
    }
}

#[tokio::test]
async fn throttling_maps_to_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PLAIN_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let result = client(&server).stream_reply(&plain_request("Hi")).await;
    assert!(matches!(result, Err(AvatarError::Request(m)) if m.contains("429")));
}

#[tokio::test]
async fn unreachable_endpoint_is_request_error() {
    let client = AzureOpenAiClient::new(ChatConfig {
        endpoint: "http://127.0.0.1:1".into(),
        deployment: "gpt-4o".into(),
        api_key: "k".into(),
        ..ChatConfig::default()
    });
    let result = client.stream_reply(&plain_request("Hi")).await;
    assert!(matches!(result, Err(AvatarError::Request(_))));
}
