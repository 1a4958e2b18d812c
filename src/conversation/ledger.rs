//! Append-only conversation record.
//!
//! The ledger is the only conversational context sent with each request.
//! Messages get consecutive sequence numbers starting at 1 and are never
//! edited once appended.

use tracing::debug;

use crate::chat::message::{Message, Role};

/// Ordered record of user, assistant, and tool messages.
#[derive(Debug, Clone)]
pub struct ConversationLedger {
    messages: Vec<Message>,
    next_sequence: u64,
}

impl Default for ConversationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Append a message, assigning it the next sequence number.
    ///
    /// Returns the assigned sequence number.
    pub fn append(&mut self, mut message: Message) -> u64 {
        let sequence = self.next_sequence;
        message.sequence = sequence;
        debug!(sequence, role = %message.role, "ledger append");
        self.messages.push(message);
        self.next_sequence += 1;
        sequence
    }

    /// Record the end of a streamed response.
    ///
    /// Tool content, when present, goes in ahead of the assistant reply. An
    /// empty reply is not recorded.
    pub fn commit_response(&mut self, tool_content: Option<String>, reply: String) {
        if let Some(tool) = tool_content.filter(|t| !t.is_empty()) {
            self.append(Message::tool(tool));
        }
        if !reply.is_empty() {
            self.append(Message::assistant(reply));
        }
    }

    /// All messages in sequence order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages with the given role.
    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message and restart numbering. Only used when a session ends.
    pub fn reset(&mut self) {
        debug!(cleared = self.messages.len(), "ledger reset");
        self.messages.clear();
        self.next_sequence = 1;
    }
}
