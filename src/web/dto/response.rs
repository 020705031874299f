//! Response DTOs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::relay::ResourceEntry;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Result of a successful upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Access code to hand to the downloader.
    #[schema(example = "0421")]
    pub code: String,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Downloads permitted before the code stops working.
    pub remaining_downloads: u32,
    /// When the code stops working regardless of downloads.
    pub expires_at: DateTime<Utc>,
}

impl UploadResponse {
    /// Build the response for a freshly created entry.
    pub fn from_entry(entry: &ResourceEntry, ttl: Duration) -> Self {
        Self {
            code: entry.code.clone(),
            size_bytes: entry.size_bytes,
            remaining_downloads: entry.remaining_downloads,
            expires_at: entry.expires_at(ttl),
        }
    }
}

/// Liveness reply of `GET /ping`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PingResponse {
    /// Always `pong`.
    pub message: String,
}
