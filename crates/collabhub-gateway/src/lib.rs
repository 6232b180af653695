//! collabhub gateway library entry.
//!
//! Wires config, the realtime core (connection registry + broadcaster), the
//! WebSocket transport and the ops endpoints into one router. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod transport;
