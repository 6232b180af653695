use std::sync::Arc;

use axum::extract::ws::Message;

use collabhub_core::error::Result;
use collabhub_core::protocol::{self, ChatMessage};

/// Message serialized once for broadcasting, shared by every recipient queue.
#[derive(Debug, Clone)]
pub struct PreparedMsg {
    text: Arc<str>,
}

impl PreparedMsg {
    pub fn prepare(msg: &ChatMessage) -> Result<Self> {
        let s = protocol::encode(msg)?;
        Ok(Self { text: Arc::from(s) })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Convert to axum::ws::Message for transport.
    /// NOTE: axum::Message::Text owns a String, so each recipient pays one copy here.
    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.text.to_string())
    }
}
