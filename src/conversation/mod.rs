//! Conversation state: the message ledger and per-response routing.

pub mod ledger;
pub mod router;

pub use ledger::ConversationLedger;
pub use router::{Routed, ToolContentRouter, strip_citations};
