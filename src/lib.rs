//! coderelay - ephemeral file relay
//!
//! A file is uploaded once and handed out under a short numeric access code.
//! The code stops working after a fixed number of downloads or once its
//! time-to-live elapses; a background sweeper then deletes the file.

pub mod config;
pub mod error;
pub mod file;
pub mod logging;
pub mod rate_limit;
pub mod relay;
pub mod web;

pub use config::Config;
pub use error::{RelayError, Result};
pub use file::FileStorage;
pub use rate_limit::{LimiterRegistry, RateLimitResult, TokenBucket};
pub use relay::{ExpirySweeper, ResourceEntry, ResourceStore};
pub use web::WebServer;
