//! Avatar chat: streaming chat-to-speech orchestration for a talking avatar.
//!
//! A user query goes to a text-generation service; the streamed reply is
//! spoken sentence by sentence while it is still arriving.
//!
//! # Architecture
//!
//! One [`Session`] drives each conversation turn through these stages:
//! - **Token stream reader** ([`chat::reader`]): response body → [`Delta`]s
//! - **Tool content router** ([`conversation::router`]): spoken text vs.
//!   retrieval/citation content
//! - **Sentence segmenter** ([`speech::segmenter`]): spoken text → utterances
//! - **Speech dispatch queue** ([`speech::queue`]): one utterance in flight,
//!   FIFO, interruptible
//! - **Conversation ledger** ([`conversation::ledger`]): ordered message
//!   history sent as context with every request
//!
//! Rendering, media transport, and audio playback live outside this crate.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod session;
pub mod speech;

pub use chat::{ChatBackend, ChatRequest, Delta, DeltaStream, Message, MessageContent, Role};
pub use config::AvatarChatConfig;
pub use conversation::{ConversationLedger, ToolContentRouter};
pub use error::{AvatarError, Result};
pub use session::{Session, TurnOutcome};
pub use speech::{SentenceSegmenter, SpeechDispatchQueue, SpeechEvent, SpeechSynthesizer, Utterance};
