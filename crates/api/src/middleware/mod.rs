//! Request guards.
//!
//! - [`api_key::RequireApiKey`] -- Requires the configured `X-API-Key`, if any.

pub mod api_key;
