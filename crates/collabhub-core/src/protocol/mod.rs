//! Wire protocol.
//!
//! One JSON object per WebSocket frame. Decoding is structural only: no field
//! is checked against sessions or users, and nothing here panics on hostile
//! input.

pub mod message;

pub use message::{decode_bytes, decode_text, encode, ChatMessage};
