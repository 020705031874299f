//! HTTP surface of the relay.
//!
//! `POST /upload`, `GET /download` and `GET /ping` sit behind the per-client
//! rate limiter; `/health` and the Swagger UI do not.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
