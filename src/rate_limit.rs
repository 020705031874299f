//! Per-client admission control.
//!
//! Every client identity (its network address) owns a [`TokenBucket`].
//! Buckets refill lazily: tokens owed since the last successful acquire are
//! computed on access, so no timer runs per identity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub use crate::config::RateLimitConfig;

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is admitted.
    Allowed,
    /// Request is denied; no token was consumed.
    Denied {
        /// Time until the next token is refilled.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Check if the request is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

/// Token bucket for a single client identity.
///
/// # Example
///
/// ```
/// use coderelay::rate_limit::TokenBucket;
/// use std::time::Duration;
///
/// let bucket = TokenBucket::new(2, Duration::from_secs(1));
/// assert!(bucket.try_acquire().is_allowed());
/// assert!(bucket.try_acquire().is_allowed());
/// assert!(!bucket.try_acquire().is_allowed());
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self::new_at(capacity, refill_interval, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
                last_seen: now,
            }),
        }
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Try to take one token now.
    pub fn try_acquire(&self) -> RateLimitResult {
        self.try_acquire_at(Instant::now())
    }

    /// Try to take one token at the given instant.
    ///
    /// Refill and decrement happen under one lock, so concurrent callers
    /// for the same identity never over-admit.
    pub fn try_acquire_at(&self, now: Instant) -> RateLimitResult {
        let mut state = self.lock();
        if now > state.last_seen {
            state.last_seen = now;
        }

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = self.refilled(state.tokens, elapsed);

        if state.tokens > 0 {
            state.tokens -= 1;
            state.last_refill = now;
            RateLimitResult::Allowed
        } else {
            RateLimitResult::Denied {
                retry_after: self.refill_interval.saturating_sub(elapsed),
            }
        }
    }

    /// Tokens that an acquire at `now` would see, without consuming any.
    pub fn available_at(&self, now: Instant) -> u32 {
        let state = self.lock();
        let elapsed = now.saturating_duration_since(state.last_refill);
        self.refilled(state.tokens, elapsed)
    }

    /// Whether the bucket has been untouched for `max_idle` and is full again.
    ///
    /// Dropping such a bucket and recreating it later is indistinguishable
    /// from keeping it.
    pub fn is_idle_at(&self, now: Instant, max_idle: Duration) -> bool {
        let state = self.lock();
        let idle = now.saturating_duration_since(state.last_seen);
        let elapsed = now.saturating_duration_since(state.last_refill);
        idle >= max_idle && self.refilled(state.tokens, elapsed) >= self.capacity
    }

    fn refilled(&self, tokens: u32, elapsed: Duration) -> u32 {
        if self.refill_interval.is_zero() {
            return self.capacity;
        }
        let new_tokens = elapsed.as_nanos() / self.refill_interval.as_nanos();
        let new_tokens = new_tokens.min(u128::from(self.capacity)) as u32;
        tokens.saturating_add(new_tokens).min(self.capacity)
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrent registry of token buckets keyed by client identity.
///
/// Buckets are created lazily on first access. The map is sharded, so
/// unrelated identities rarely contend.
#[derive(Debug)]
pub struct LimiterRegistry {
    capacity: u32,
    refill_interval: Duration,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity,
            refill_interval: config.refill_interval(),
            buckets: DashMap::new(),
        }
    }

    /// Get the bucket for `identity`, inserting a full one if absent.
    ///
    /// Concurrent first accesses all observe the same bucket.
    pub fn get_or_create(&self, identity: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(identity) {
            return Arc::clone(bucket.value());
        }

        let entry = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.capacity, self.refill_interval)));
        Arc::clone(entry.value())
    }

    /// Admission check for `identity` at the current instant.
    pub fn check(&self, identity: &str) -> RateLimitResult {
        self.get_or_create(identity).try_acquire()
    }

    /// Admission check for `identity` at the given instant.
    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitResult {
        self.get_or_create(identity).try_acquire_at(now)
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no identity is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that have been idle for `max_idle` and are full again.
    ///
    /// Buckets currently borrowed by a request are kept. Returns the number
    /// of evicted identities.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(Instant::now(), max_idle)
    }

    /// [`evict_idle`](Self::evict_idle) with an explicit clock.
    pub fn evict_idle_at(&self, now: Instant, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            Arc::strong_count(bucket) > 1 || !bucket.is_idle_at(now, max_idle)
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Start a background task that periodically evicts idle buckets.
    pub fn start_cleanup_task(self: Arc<Self>, max_idle: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(max_idle.max(Duration::from_secs(1)));
            interval.tick().await;

            loop {
                interval.tick().await;
                let evicted = self.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = self.len(), "Evicted idle limiters");
                }
            }
        });
    }
}
