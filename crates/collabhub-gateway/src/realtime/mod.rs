//! Realtime runtime (egress engine) for the collabhub gateway.
//!
//! Connection registry + global broadcast fan-out.

pub mod core;
pub mod types;

pub use core::{BroadcastReport, Broadcaster, ConnId, Connection, ConnectionRegistry, DeliveryFailure};
pub use types::PreparedMsg;
