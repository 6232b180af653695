//! Top-level facade crate for collabhub.
//!
//! Re-exports the wire types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use collabhub_core::*;
}

pub mod gateway {
    pub use collabhub_gateway::*;
}
