//! Decode-once codec for the transport layer.
//!
//! - Text and Binary frames => `ChatMessage` (JSON)
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use collabhub_core::{error::Result, protocol};

#[derive(Debug)]
pub enum Inbound {
    Chat {
        msg: protocol::ChatMessage,
        bytes_len: usize,
    },
    Ping,
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let bytes_len = s.len();
            let msg = protocol::decode_text(&s)?;
            Ok(Inbound::Chat { msg, bytes_len })
        }
        Message::Binary(b) => {
            let bytes_len = b.len();
            let msg = protocol::decode_bytes(&b)?;
            Ok(Inbound::Chat { msg, bytes_len })
        }
        Message::Ping(_) => Ok(Inbound::Ping),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
