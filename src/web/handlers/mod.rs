//! API handlers.

pub mod relay;

pub use relay::*;

use std::sync::Arc;

use crate::config::Config;
use crate::file::FileStorage;
use crate::rate_limit::LimiterRegistry;
use crate::relay::ResourceStore;
use crate::Result;

/// Shared application state.
pub struct AppState {
    /// Upload metadata.
    pub store: Arc<ResourceStore>,
    /// Uploaded files.
    pub storage: Arc<FileStorage>,
    /// Per-client admission control.
    pub limiters: Arc<LimiterRegistry>,
    /// Upload cap in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new AppState from already constructed components.
    pub fn new(
        store: Arc<ResourceStore>,
        storage: Arc<FileStorage>,
        limiters: Arc<LimiterRegistry>,
        max_upload_size: u64,
    ) -> Self {
        Self {
            store,
            storage,
            limiters,
            max_upload_size,
        }
    }

    /// Build every component from configuration.
    ///
    /// Creates the storage directory if needed.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(ResourceStore::new(&config.relay)?),
            Arc::new(FileStorage::new(&config.storage.path)?),
            Arc::new(LimiterRegistry::new(&config.rate_limit)),
            config.relay.max_upload_bytes(),
        ))
    }
}
