//! Middleware for the relay API.

pub mod cors;
pub mod rate_limit;

pub use cors::create_cors_layer;
pub use rate_limit::{client_identity, relay_rate_limit};
