//! Concurrent code → entry store.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::code::CodeGenerator;
use super::entry::ResourceEntry;
use crate::config::RelayConfig;
use crate::{RelayError, Result};

/// Live uploads keyed by access code.
///
/// The map is sharded, so locking is per shard rather than global. An entry
/// keeps its code until the sweeper evicts it, even once it is expired or
/// exhausted, because its directory is still on disk until then.
///
/// # Example
///
/// ```
/// use coderelay::config::RelayConfig;
/// use coderelay::relay::ResourceStore;
///
/// let store = ResourceStore::new(&RelayConfig::default()).unwrap();
/// let entry = store.create(10).unwrap();
///
/// for _ in 0..3 {
///     assert!(store.consume(&entry.code).is_ok());
/// }
/// assert!(store.consume(&entry.code).is_err());
/// ```
#[derive(Debug)]
pub struct ResourceStore {
    codes: CodeGenerator,
    ttl: Duration,
    quota: u32,
    entries: DashMap<String, ResourceEntry>,
}

impl ResourceStore {
    /// Create an empty store.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        Ok(Self {
            codes: CodeGenerator::new(config.code_length, config.max_code_attempts)?,
            ttl: config.ttl(),
            quota: config.max_downloads,
            entries: DashMap::new(),
        })
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Downloads granted to each new entry.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Code generator used by this store.
    pub fn codes(&self) -> &CodeGenerator {
        &self.codes
    }

    /// Pick a code not held by any entry.
    ///
    /// The code is not reserved; [`create`](Self::create) picks and inserts
    /// under one lock instead.
    pub fn generate_code(&self) -> Result<String> {
        self.claim_free(|code| (!self.entries.contains_key(&code)).then_some(code))
    }

    /// Register a new upload of `size_bytes` and return its entry.
    ///
    /// The entry is downloadable immediately. Use [`reserve`](Self::reserve)
    /// when the file is written after the code is chosen.
    pub fn create(&self, size_bytes: u64) -> Result<ResourceEntry> {
        self.create_at(size_bytes, Utc::now())
    }

    /// [`create`](Self::create) with an explicit upload time.
    pub fn create_at(&self, size_bytes: u64, now: DateTime<Utc>) -> Result<ResourceEntry> {
        self.insert_at(size_bytes, now, false)
    }

    /// Claim a code for an upload whose file is not stored yet.
    ///
    /// The entry holds its code but `consume` rejects it until
    /// [`confirm`](Self::confirm) is called.
    pub fn reserve(&self, size_bytes: u64) -> Result<ResourceEntry> {
        self.reserve_at(size_bytes, Utc::now())
    }

    /// [`reserve`](Self::reserve) with an explicit upload time.
    pub fn reserve_at(&self, size_bytes: u64, now: DateTime<Utc>) -> Result<ResourceEntry> {
        self.insert_at(size_bytes, now, true)
    }

    /// Make a reserved entry downloadable.
    ///
    /// Returns `false` if the entry is gone.
    pub fn confirm(&self, code: &str) -> bool {
        match self.entries.get_mut(code) {
            Some(mut entry) => {
                entry.pending = false;
                true
            }
            None => false,
        }
    }

    fn insert_at(
        &self,
        size_bytes: u64,
        now: DateTime<Utc>,
        pending: bool,
    ) -> Result<ResourceEntry> {
        let entry = self.claim_free(|code| match self.entries.entry(code) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let mut entry =
                    ResourceEntry::new(vacant.key().clone(), now, size_bytes, self.quota);
                entry.pending = pending;
                vacant.insert(entry.clone());
                Some(entry)
            }
        })?;

        tracing::debug!(code = %entry.code, size_bytes, pending, "Created resource entry");
        Ok(entry)
    }

    /// Spend one download of `code`.
    ///
    /// Fails with [`RelayError::InvalidCode`] if the code is unknown, pending,
    /// expired or exhausted. On success the returned snapshot already
    /// reflects the decrement.
    pub fn consume(&self, code: &str) -> Result<ResourceEntry> {
        self.consume_at(code, Utc::now())
    }

    /// [`consume`](Self::consume) with an explicit clock.
    pub fn consume_at(&self, code: &str, now: DateTime<Utc>) -> Result<ResourceEntry> {
        let mut entry = self.entries.get_mut(code).ok_or(RelayError::InvalidCode)?;

        if !entry.is_readable_at(now, self.ttl) {
            return Err(RelayError::InvalidCode);
        }

        entry.remaining_downloads -= 1;
        Ok(entry.value().clone())
    }

    /// Remove every entry older than the TTL and return the removed codes.
    ///
    /// The codes are free for reuse as soon as this returns. Callers that
    /// still have to delete stored data should use
    /// [`expired_codes_at`](Self::expired_codes_at) and
    /// [`remove_expired_at`](Self::remove_expired_at) instead.
    pub fn evict_expired(&self) -> Vec<String> {
        self.evict_expired_at(Utc::now())
    }

    /// [`evict_expired`](Self::evict_expired) with an explicit clock.
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|code, entry| {
            if entry.is_expired_at(now, self.ttl) {
                removed.push(code.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        removed
    }

    /// Codes of every entry older than the TTL at `now`, without removing them.
    pub fn expired_codes_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired_at(now, self.ttl))
            .map(|entry| entry.key().clone())
            .collect();
        expired.sort();
        expired
    }

    /// Remove `code` if it is expired at `now`.
    pub fn remove_expired_at(&self, code: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .remove_if(code, |_, entry| entry.is_expired_at(now, self.ttl))
            .is_some()
    }

    /// Run `f` while `code` is held unclaimed.
    ///
    /// Returns `None` without running `f` if an entry holds `code`. While `f`
    /// runs no `create` can claim `code`, and other store calls touching its
    /// shard wait, so `f` must not call back into the store.
    pub fn with_unclaimed<T>(&self, code: &str, f: impl FnOnce() -> T) -> Option<T> {
        match self.entries.entry(code.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(_held) => Some(f()),
        }
    }

    /// Remove an entry regardless of its age.
    ///
    /// Used to roll back an upload whose file could not be stored.
    pub fn discard(&self, code: &str) -> Option<ResourceEntry> {
        self.entries.remove(code).map(|(_, entry)| entry)
    }

    /// Snapshot of the entry for `code`, if present.
    pub fn get(&self, code: &str) -> Option<ResourceEntry> {
        self.entries.get(code).map(|entry| entry.value().clone())
    }

    /// Whether an entry for `code` is present (live or not).
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `claim` on candidate codes until it accepts one.
    ///
    /// Random draws first, then a linear probe once `max_attempts` draws
    /// have collided, so a free code is always found if one exists.
    fn claim_free<T>(&self, mut claim: impl FnMut(String) -> Option<T>) -> Result<T> {
        if self.entries.len() as u64 >= self.codes.space() {
            return Err(RelayError::CodeSpaceExhausted);
        }

        for _ in 0..self.codes.max_attempts() {
            if let Some(claimed) = claim(self.codes.random()) {
                return Ok(claimed);
            }
        }

        tracing::warn!(
            live = self.entries.len(),
            space = self.codes.space(),
            "Code generation fell back to linear probe"
        );
        self.codes
            .probe_order()
            .find_map(claim)
            .ok_or(RelayError::CodeSpaceExhausted)
    }
}
