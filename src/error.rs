//! Error types for the chat-to-speech orchestrator.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`AvatarError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The chat request could not be sent or was rejected.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Reading the streamed response failed mid-way.
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";

    /// A single streamed block could not be parsed.
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";

    /// Speech synthesis of one utterance failed.
    pub const SYNTHESIS_FAILED: &str = "SYNTHESIS_FAILED";

    /// The operation was interrupted by the user.
    pub const CANCELLED: &str = "CANCELLED";

    /// The session is not in a state that allows the operation.
    pub const SESSION_ERROR: &str = "SESSION_ERROR";

    /// Local I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Errors produced by the orchestrator.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// The chat request could not be sent, or the service answered with a
    /// non-success status before any streaming began.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Authentication failed (401/403).
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// The response stream failed while being read. Fatal for the turn,
    /// not for the session.
    #[error("[{}] {}", error_codes::TRANSPORT_FAILED, .0)]
    Transport(String),

    /// One malformed block in the response stream. Non-fatal.
    #[error("[{}] {}", error_codes::PROTOCOL_ERROR, .0)]
    Protocol(String),

    /// One utterance failed to synthesize. Non-fatal.
    #[error("[{}] {}", error_codes::SYNTHESIS_FAILED, .0)]
    Synthesis(String),

    /// User-initiated interruption.
    #[error("[{}] {}", error_codes::CANCELLED, .0)]
    Cancelled(String),

    /// Operation on a stopped session.
    #[error("[{}] {}", error_codes::SESSION_ERROR, .0)]
    Session(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl AvatarError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::Transport(_) => error_codes::TRANSPORT_FAILED,
            Self::Protocol(_) => error_codes::PROTOCOL_ERROR,
            Self::Synthesis(_) => error_codes::SYNTHESIS_FAILED,
            Self::Cancelled(_) => error_codes::CANCELLED,
            Self::Session(_) => error_codes::SESSION_ERROR,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Request(m)
            | Self::Auth(m)
            | Self::Transport(m)
            | Self::Protocol(m)
            | Self::Synthesis(m)
            | Self::Cancelled(m)
            | Self::Session(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Whether this error ends the current conversation turn.
    ///
    /// Protocol and synthesis errors are absorbed where they occur, and a
    /// cancellation is a normal end of the in-flight utterance.
    pub fn is_fatal_to_turn(&self) -> bool {
        !matches!(
            self,
            Self::Protocol(_) | Self::Synthesis(_) | Self::Cancelled(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AvatarError>;
