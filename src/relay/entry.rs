//! Per-upload metadata.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Quota and expiry state of one uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEntry {
    /// Zero-padded decimal access code.
    pub code: String,
    /// When the upload was accepted.
    pub uploaded_at: DateTime<Utc>,
    /// Size of the stored file in bytes.
    pub size_bytes: u64,
    /// Downloads still permitted.
    pub remaining_downloads: u32,
    /// Reserved code whose file is not stored yet.
    #[serde(skip)]
    pub pending: bool,
}

impl ResourceEntry {
    /// Create a new entry with a full download quota.
    pub fn new(
        code: impl Into<String>,
        uploaded_at: DateTime<Utc>,
        size_bytes: u64,
        quota: u32,
    ) -> Self {
        Self {
            code: code.into(),
            uploaded_at,
            size_bytes,
            remaining_downloads: quota,
            pending: false,
        }
    }

    /// Age of the entry at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.uploaded_at
    }

    /// Whether the entry is older than `ttl` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) > ttl
    }

    /// Whether the download quota is used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_downloads == 0
    }

    /// Whether a download at `now` would be permitted.
    pub fn is_readable_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.pending && !self.is_exhausted() && !self.is_expired_at(now, ttl)
    }

    /// Instant after which the entry is expired.
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.uploaded_at + ttl
    }
}
