//! Periodic expiry sweep.
//!
//! Entries are not removed the moment they expire: `consume` checks the age
//! itself, and the sweeper reaps the metadata and the backing directories in
//! batches on a fixed schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::ResourceStore;
use crate::Result;

/// A code directory found in backing storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    /// Code the directory belongs to.
    pub code: String,
    /// Last modification time of the directory.
    pub modified: DateTime<Utc>,
}

/// Backing storage the sweeper deletes from.
pub trait BackingStore: Send + Sync {
    /// Delete everything stored under `code`.
    ///
    /// Returns `false` if nothing was stored.
    fn remove(&self, code: &str) -> Result<bool>;

    /// List every code currently holding data.
    fn list(&self) -> Result<Vec<StoredItem>>;
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Codes evicted from the store.
    pub evicted: Vec<String>,
    /// Evicted codes whose backing data could not be deleted, with the error.
    pub failed: Vec<(String, String)>,
    /// Directories deleted that had no entry in the store.
    pub orphans_removed: Vec<String>,
}

impl SweepReport {
    /// Whether the sweep did nothing.
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.failed.is_empty() && self.orphans_removed.is_empty()
    }
}

/// Evicts expired entries and deletes their backing data.
pub struct ExpirySweeper {
    store: Arc<ResourceStore>,
    backing: Arc<dyn BackingStore>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper that runs every `interval`.
    pub fn new(
        store: Arc<ResourceStore>,
        backing: Arc<dyn BackingStore>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            backing,
            interval,
        }
    }

    /// Time between two sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Run one sweep with an explicit clock.
    ///
    /// An expired entry keeps its code until its backing data is gone, so
    /// no new upload can land in a directory that is about to be deleted.
    /// A failed delete does not abort the pass; the entry stays in the store
    /// (already unreadable) and the delete is retried on the next sweep.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for code in self.store.expired_codes_at(now) {
            match self.backing.remove(&code) {
                Ok(_) => {
                    if self.store.remove_expired_at(&code, now) {
                        report.evicted.push(code);
                    }
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "Failed to delete expired upload");
                    report.failed.push((code, e.to_string()));
                }
            }
        }

        self.prune_orphans(now, &mut report);

        if report.is_empty() {
            debug!("Sweep found nothing to clean up");
        } else {
            info!(
                evicted = report.evicted.len(),
                failed = report.failed.len(),
                orphans = report.orphans_removed.len(),
                "Sweep finished"
            );
        }

        report
    }

    fn prune_orphans(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let items = match self.backing.list() {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Failed to list stored uploads");
                return;
            }
        };

        let ttl = self.store.ttl();
        for item in items {
            if now - item.modified <= ttl || self.store.contains(&item.code) {
                continue;
            }

            // The listing may be stale; the code stays unclaimed during the delete.
            let removed = self
                .store
                .with_unclaimed(&item.code, || self.backing.remove(&item.code));

            match removed {
                None | Some(Ok(false)) => {}
                Some(Ok(true)) => report.orphans_removed.push(item.code),
                Some(Err(e)) => {
                    warn!(code = %item.code, error = %e, "Failed to delete orphaned upload");
                    report.failed.push((item.code, e.to_string()));
                }
            }
        }
    }

    /// Spawn the periodic sweep loop.
    ///
    /// The first sweep runs one interval after start. Each pass runs on the
    /// blocking pool since deletes hit the filesystem.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Expiry sweeper started (interval: {} seconds)",
                self.interval.as_secs()
            );

            let mut timer = tokio::time::interval(self.interval);
            timer.tick().await;

            loop {
                timer.tick().await;

                let sweeper = Arc::clone(&self);
                if let Err(e) = tokio::task::spawn_blocking(move || sweeper.sweep()).await {
                    warn!(error = %e, "Sweep task panicked");
                }
            }
        })
    }
}
