//! Text-generation side of the conversation.
//!
//! - [`sse`] frames the raw response body into blocks.
//! - [`delta`] projects each block into a [`Delta`](delta::Delta).
//! - [`reader`] ties the two into a lazy [`DeltaStream`](reader::DeltaStream).
//! - [`client`] sends requests and hands back that stream.
//! - [`message`] holds the conversation message types.

pub mod client;
pub mod delta;
pub mod message;
pub mod reader;
pub mod sse;

pub use client::{AzureOpenAiClient, ChatBackend, ChatRequest};
pub use delta::{Delta, ResponseMode};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use reader::{DeltaStream, read_deltas};
