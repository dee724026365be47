//! Online population with a last-known-good fallback.
//!
//! # Design Decisions
//! - A failed live query is an expected outcome, reported as
//!   [`Population::Fallback`] or [`Population::Unavailable`] rather than an error
//! - The fallback value only changes on success and never expires; an old
//!   fallback is still served, with a warning once it is past its TTL

use crate::cache::CacheEntry;
use realmwatch_db::CharacterStore;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Age after which a served fallback count is logged as stale.
pub const DEFAULT_POPULATION_TTL: Duration = Duration::from_secs(30);

/// Source of the live online-character count.
pub trait PopulationStore: Send + Sync {
    fn online_players(&self) -> impl Future<Output = realmwatch_db::Result<u32>> + Send;
}

impl PopulationStore for CharacterStore {
    async fn online_players(&self) -> realmwatch_db::Result<u32> {
        self.count_online().await
    }
}

/// Result of a population lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    /// Fresh count from the store.
    Live(u32),
    /// The store failed; this is the last successful count.
    Fallback { count: u32, age: Duration },
    /// The store failed and has never succeeded.
    Unavailable,
}

impl Population {
    /// The number to display.
    pub fn count(&self) -> u32 {
        match *self {
            Population::Live(count) | Population::Fallback { count, .. } => count,
            Population::Unavailable => 0,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Population::Live(_))
    }
}

/// Wraps a [`PopulationStore`] and remembers its last good answer.
pub struct PopulationGateway<S> {
    store: S,
    fallback_ttl: Duration,
    fallback: Mutex<Option<CacheEntry<u32>>>,
}

impl<S: PopulationStore> PopulationGateway<S> {
    pub fn new(store: S, fallback_ttl: Duration) -> Self {
        Self {
            store,
            fallback_ttl,
            fallback: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Query the store once; on failure fall back to the last good count.
    pub async fn get_population(&self) -> Population {
        match self.store.online_players().await {
            Ok(count) => {
                *self.lock_fallback() = Some(CacheEntry::new(count));
                debug!(count, "population refreshed");
                Population::Live(count)
            }
            Err(err) => match self.fallback() {
                Some(entry) => {
                    let age = entry.age();
                    if age >= self.fallback_ttl {
                        warn!(error = %err, count = *entry.value(), age_secs = age.as_secs(), "population query failed, serving stale fallback");
                    } else {
                        warn!(error = %err, count = *entry.value(), "population query failed, serving fallback");
                    }
                    Population::Fallback {
                        count: *entry.value(),
                        age,
                    }
                }
                None => {
                    error!(error = %err, "population query failed with no fallback, reporting 0");
                    Population::Unavailable
                }
            },
        }
    }

    /// The last successful count and when it was taken.
    pub fn fallback(&self) -> Option<CacheEntry<u32>> {
        self.lock_fallback().clone()
    }

    fn lock_fallback(&self) -> std::sync::MutexGuard<'_, Option<CacheEntry<u32>>> {
        self.fallback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
