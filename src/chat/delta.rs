//! Projection of streamed response blocks into [`Delta`] records.
//!
//! Two block shapes are understood, selected by [`ResponseMode`]:
//!
//! - plain: `{"choices":[{"delta":{"role":..,"content":..}}]}`
//! - retrieval: `{"choices":[{"messages":[{"delta":{"role":..,"content":..}}]}]}`
//!
//! Only the first choice (and, in retrieval mode, its first message) is
//! projected. Additional choices are ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::message::Role;
use crate::chat::sse::DONE_SENTINEL;
use crate::error::{AvatarError, Result};

/// Shape of the blocks in a streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Plain chat completions.
    #[default]
    Plain,
    /// Retrieval-augmented completions with interleaved tool messages.
    Retrieval,
}

/// One incremental fragment of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    /// Role announced by the block, if any.
    pub role: Option<Role>,
    /// Text carried by the block. Empty for role-only or filter blocks.
    pub text: String,
    /// Set on the `[DONE]` block; nothing follows it.
    pub is_terminal: bool,
}

impl Delta {
    /// A content delta with no role.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            role: None,
            text: text.into(),
            is_terminal: false,
        }
    }

    /// A content delta with an explicit role.
    pub fn with_role(role: Role, text: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            text: text.into(),
            is_terminal: false,
        }
    }

    /// The end-of-stream marker.
    pub fn terminal() -> Self {
        Self {
            role: None,
            text: String::new(),
            is_terminal: true,
        }
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        "user" => Some(Role::User),
        "system" => Some(Role::System),
        other => {
            debug!(role = other, "ignoring unknown delta role");
            None
        }
    }
}

/// Parse the payload of one block.
///
/// # Errors
///
/// Returns [`AvatarError::Protocol`] when the payload is not a JSON object.
/// A well-formed object without the expected fields yields an empty delta.
pub fn parse_block(data: &str, mode: ResponseMode) -> Result<Delta> {
    if data.trim() == DONE_SENTINEL {
        return Ok(Delta::terminal());
    }

    let parsed: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| AvatarError::Protocol(format!("malformed block: {e}")))?;
    if !parsed.is_object() {
        return Err(AvatarError::Protocol(format!(
            "expected a JSON object, got: {parsed}"
        )));
    }

    let first_choice = parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let delta = match mode {
        ResponseMode::Plain => first_choice.and_then(|c| c.get("delta")),
        ResponseMode::Retrieval => first_choice
            .and_then(|c| c.get("messages"))
            .and_then(|m| m.as_array())
            .and_then(|m| m.first())
            .and_then(|m| m.get("delta")),
    };

    let Some(delta) = delta else {
        return Ok(Delta::default());
    };

    Ok(Delta {
        role: delta.get("role").and_then(|r| r.as_str()).and_then(parse_role),
        text: delta
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_owned(),
        is_terminal: false,
    })
}
