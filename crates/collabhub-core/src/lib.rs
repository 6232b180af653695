//! collabhub core: transport-agnostic wire message and error types.
//!
//! This crate defines the wire-level contract and error surface shared by the
//! gateway and its tests. It carries no transport or runtime dependencies so
//! it can be reused by clients and tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input surfaces as `CollabError::Decode` so a hostile client can
//! only ever end its own connection.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{CollabError, Result};
