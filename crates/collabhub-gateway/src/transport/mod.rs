//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the codec that turns frames into chat
//! messages before they reach the broadcaster.

pub mod codec;
pub mod ws;
