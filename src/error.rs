//! Error types for coderelay.

use std::time::Duration;

use thiserror::Error;

/// Common error type for coderelay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Admission denied by the per-client token bucket.
    ///
    /// No state was mutated; the caller may retry after `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the next token becomes available.
        retry_after: Duration,
    },

    /// The code is unknown, expired, or has no downloads left.
    ///
    /// Callers cannot tell the three cases apart.
    #[error("invalid code")]
    InvalidCode,

    /// Upload exceeds the configured size cap.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// Every code of the configured width is taken.
    #[error("code space exhausted")]
    CodeSpaceExhausted,

    /// Backing storage failure (write, read or delete).
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for coderelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
