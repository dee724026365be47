//! Time-stamped cache entries and the composite status cache.

use crate::status::CompositeStatus;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Default freshness window for composite status.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(10);

/// A value together with the moment it was recorded.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: T,
    recorded_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Record `value` as of now.
    pub fn new(value: T) -> Self {
        Self {
            value,
            recorded_at: Instant::now(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn recorded_at(&self) -> Instant {
        self.recorded_at
    }

    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }

    /// Younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Memoizes the last composite status for a short window.
///
/// The entry lock is held for the whole recomputation, so callers that
/// arrive while a refresh is running wait for it and share its result
/// instead of starting their own.
pub struct StatusCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry<Arc<CompositeStatus>>>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached status if fresh, otherwise run `compute`, store its
    /// result and return that.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> Arc<CompositeStatus>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CompositeStatus>,
    {
        let mut entry = self.entry.lock().await;

        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            debug!(age_ms = cached.age().as_millis() as u64, "serving cached status");
            return Arc::clone(cached.value());
        }

        let status = Arc::new(compute().await);
        *entry = Some(CacheEntry::new(Arc::clone(&status)));
        status
    }

    /// The stored entry, fresh or not, without computing anything.
    pub async fn peek(&self) -> Option<CacheEntry<Arc<CompositeStatus>>> {
        self.entry.lock().await.clone()
    }

    /// Forget the stored entry so the next call recomputes.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_TTL)
    }
}
