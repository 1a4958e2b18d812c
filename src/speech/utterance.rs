//! Speakable units and their lifecycle.

use std::time::Instant;

/// Lifecycle of an utterance in the dispatch queue.
///
/// `Pending → Speaking → Completed | Failed | Cancelled`, or
/// `Pending → Cancelled` when discarded before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtteranceState {
    Pending,
    Speaking,
    Completed,
    Failed,
    Cancelled,
}

impl UtteranceState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Speaking)
                | (Self::Pending, Self::Cancelled)
                | (Self::Speaking, Self::Completed)
                | (Self::Speaking, Self::Failed)
                | (Self::Speaking, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for UtteranceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Speaking => "speaking",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One unit of text handed to the speech backend.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Queue-assigned id. `0` until enqueued.
    pub id: u64,
    pub text: String,
    /// Silence appended after the text, in milliseconds.
    pub trailing_silence_ms: u32,
    pub state: UtteranceState,
    pub enqueued_at: Instant,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            text: text.into(),
            trailing_silence_ms: 0,
            state: UtteranceState::Pending,
            enqueued_at: Instant::now(),
        }
    }

    /// Builder-style trailing silence.
    pub fn with_trailing_silence(mut self, ms: u32) -> Self {
        self.trailing_silence_ms = ms;
        self
    }

    /// Whether there is nothing audible to synthesize.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.trailing_silence_ms == 0
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn transition(&mut self, next: UtteranceState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}
