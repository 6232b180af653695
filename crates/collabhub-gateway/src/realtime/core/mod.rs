//! Realtime core components for the gateway runtime.
//!
//! The connection registry and the broadcaster that fans messages out over it.

mod broadcast;
mod registry;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use registry::{ConnId, Connection, ConnectionRegistry, DeliveryFailure};
