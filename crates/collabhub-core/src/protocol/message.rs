//! Chat message (JSON).

use serde::{Deserialize, Serialize};

use crate::error::{CollabError, Result};

/// A message relayed to every open connection.
///
/// Missing fields decode as empty strings and unknown fields are ignored.
/// A field with the wrong JSON type is a malformed payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            content: content.into(),
        }
    }
}

/// Decode a message from a text frame.
pub fn decode_text(s: &str) -> Result<ChatMessage> {
    serde_json::from_str(s).map_err(|e| CollabError::Decode(format!("invalid message json: {e}")))
}

/// Decode a message from a binary frame carrying JSON.
pub fn decode_bytes(b: &[u8]) -> Result<ChatMessage> {
    serde_json::from_slice(b)
        .map_err(|e| CollabError::Decode(format!("invalid message json: {e}")))
}

/// Encode a message for the wire.
pub fn encode(msg: &ChatMessage) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| CollabError::Internal(format!("json encode failed: {e}")))
}
