//! Shared error type across collabhub crates.

use thiserror::Error;

/// Stable error codes. Used as a structured log field, never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid configuration or request.
    BadRequest,
    /// Malformed inbound payload.
    Decode,
    /// Socket-level failure (read, write, upgrade).
    Transport,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Decode => "DECODE",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CollabError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("malformed payload: {0}")]
    Decode(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CollabError::BadRequest(_) => ErrorCode::BadRequest,
            CollabError::Decode(_) => ErrorCode::Decode,
            CollabError::Transport(_) => ErrorCode::Transport,
            CollabError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            CollabError::Internal(_) => ErrorCode::Internal,
        }
    }
}
