//! Last displayed status, as seen by the presentation side.

use crate::bridge::CheckOutcome;
use crate::status::CompositeStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Holds the status currently on display.
///
/// A failed check leaves the previous status in place; the board never shows
/// an error state of its own.
#[derive(Default)]
pub struct StatusBoard {
    current: RwLock<Option<Arc<CompositeStatus>>>,
    updates: AtomicU64,
    failures: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the outcome of one check.
    pub fn apply(&self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Completed(status) => {
                info!(
                    label = %status.label(),
                    realm = status.realm_name(),
                    population = %status.population_line(),
                    "status updated"
                );
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(status);
                self.updates.fetch_add(1, Ordering::Relaxed);
            }
            CheckOutcome::Failed(err) => {
                warn!(error = %err, "status unknown, keeping last displayed status");
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// The status on display, if any check has completed yet.
    pub fn current(&self) -> Option<Arc<CompositeStatus>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed checks applied.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Number of failed checks ignored.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
