//! Text-generation service client.
//!
//! [`ChatBackend`] is the seam the session talks to; [`AzureOpenAiClient`] is
//! the HTTP implementation for Azure OpenAI chat completions, including the
//! retrieval ("extensions") endpoint that interleaves tool messages with the
//! assistant reply.

use async_trait::async_trait;

use crate::chat::delta::ResponseMode;
use crate::chat::message::Message;
use crate::chat::reader::{DeltaStream, read_deltas};
use crate::config::{ChatConfig, RetrievalConfig};
use crate::error::{AvatarError, Result};

/// Everything needed for one streamed completion.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt sent ahead of the conversation.
    pub system_prompt: Option<String>,
    /// Ordered conversation context, ending with the new user message.
    pub messages: Vec<Message>,
    /// Search data source; selects retrieval mode when present.
    pub retrieval: Option<RetrievalConfig>,
}

impl ChatRequest {
    /// Block shape the response will use.
    pub fn mode(&self) -> ResponseMode {
        if self.retrieval.is_some() {
            ResponseMode::Retrieval
        } else {
            ResponseMode::Plain
        }
    }
}

/// A streaming text-generation backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Send the request and return the reply as a delta stream.
    ///
    /// # Errors
    ///
    /// Fails before streaming starts on connection or HTTP status errors.
    /// Failures while reading the body are reported inside the stream.
    async fn stream_reply(&self, request: &ChatRequest) -> Result<DeltaStream>;
}

/// Completion URL for the configured deployment.
pub fn chat_url(config: &ChatConfig, retrieval: bool) -> String {
    let endpoint = config.endpoint.trim_end_matches('/');
    let route = if retrieval {
        "extensions/chat/completions"
    } else {
        "chat/completions"
    };
    format!(
        "{endpoint}/openai/deployments/{}/{route}?api-version={}",
        config.deployment, config.api_version
    )
}

/// JSON body for a streamed completion.
pub fn build_request_body(request: &ChatRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        messages.push(Message::system(prompt).to_wire());
    }
    messages.extend(request.messages.iter().map(Message::to_wire));

    let mut body = serde_json::json!({
        "messages": messages,
        "stream": true,
    });

    if let (Some(retrieval), Some(obj)) = (&request.retrieval, body.as_object_mut()) {
        obj.insert(
            "dataSources".into(),
            serde_json::json!([{
                "type": "AzureCognitiveSearch",
                "parameters": {
                    "endpoint": retrieval.endpoint,
                    "key": retrieval.key,
                    "indexName": retrieval.index_name,
                    "semanticConfiguration": "",
                    "queryType": "simple",
                    "fieldsMapping": {
                        "contentFieldsSeparator": "\n",
                        "contentFields": ["content"],
                        "filepathField": null,
                        "titleField": "title",
                        "urlField": null,
                    },
                    "inScope": true,
                    "roleInformation": request.system_prompt.clone().unwrap_or_default(),
                },
            }]),
        );
    }

    body
}

/// Azure OpenAI chat completions over HTTP.
pub struct AzureOpenAiClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("endpoint", &self.config.endpoint)
            .field("deployment", &self.config.deployment)
            .finish()
    }
}

impl AzureOpenAiClient {
    /// Create a client for the given service settings.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Map a non-success HTTP status to an error.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> AvatarError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => AvatarError::Auth(format!("chat service rejected credentials: {message}")),
            code => AvatarError::Request(format!("chat service HTTP {code}: {message}")),
        }
    }
}

/// Pull `error.message` out of an error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[async_trait]
impl ChatBackend for AzureOpenAiClient {
    fn name(&self) -> &str {
        "azure-openai"
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let mode = request.mode();
        let url = chat_url(&self.config, mode == ResponseMode::Retrieval);
        let body = build_request_body(request);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AvatarError::Request(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        Ok(read_deltas(response.bytes_stream(), mode))
    }
}
