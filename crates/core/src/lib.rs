//! Shared domain types for the OPC bridge.
//!
//! Holds the pieces every other crate agrees on: the timestamp alias,
//! the domain error type and the [`snapshot`] module with the cache that
//! the poller writes and the HTTP layer reads.

pub mod error;
pub mod snapshot;
pub mod types;
