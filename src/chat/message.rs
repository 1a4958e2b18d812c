//! Conversation message types.
//!
//! Messages are what the [`ConversationLedger`](crate::conversation::ConversationLedger)
//! stores and what each chat request carries as context.
//!
//! # Examples
//!
//! ```
//! use avatar_chat::chat::message::{Message, MessageContent, Role};
//!
//! let msg = Message::user_with_image("What is this?", "https://example.com/cat.png");
//! assert_eq!(msg.role, Role::User);
//! assert!(matches!(msg.content, MessageContent::Multimodal(_)));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions. Never stored in the ledger.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
    /// Auxiliary retrieval/citation content.
    Tool,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text segment.
    Text {
        /// The text.
        text: String,
    },
    /// A reference to an image the model should look at.
    ImageUrl {
        /// Image location.
        url: String,
    },
}

/// The content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Ordered text and image parts.
    Multimodal(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the content, ignoring images.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Multimodal(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }

    /// Chat-completions wire form: a string, or an array of typed parts.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Multimodal(parts) => serde_json::Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => {
                            serde_json::json!({"type": "text", "text": text})
                        }
                        ContentPart::ImageUrl { url } => {
                            serde_json::json!({"type": "image_url", "image_url": {"url": url}})
                        }
                    })
                    .collect(),
            ),
        }
    }
}

/// A message in the conversation.
///
/// `sequence` is assigned by the ledger on append; a message built with the
/// constructors below has sequence `0` until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,
    /// The message content.
    pub content: MessageContent,
    /// Position in the ledger.
    pub sequence: u64,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a text message with the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create a user message with an attached image.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Multimodal(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    url: image_url.into(),
                },
            ]),
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create a tool (citation) message.
    pub fn tool(text: impl Into<String>) -> Self {
        Self::text(Role::Tool, text)
    }

    /// Chat-completions wire form: `{"role": ..., "content": ...}`.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "content": self.content.to_wire(),
        })
    }
}
