//! Hand-off between the control thread and the monitor worker.
//!
//! # Responsibilities
//! - Own a worker thread running a single-threaded tokio runtime that does
//!   all probe and database I/O
//! - Accept check requests from the control thread and report each outcome
//!   through a [`CheckHandle`]
//!
//! # Design Decisions
//! - The worker owns the aggregator and the status cache; nothing else
//!   touches them
//! - Requests are served one at a time, so cycles never overlap
//! - No retries: a failed check stays failed until the next trigger

use crate::aggregator::{StatusAggregator, panic_message};
use crate::cache::StatusCache;
use crate::control::ControlSender;
use crate::population::PopulationStore;
use crate::probe::Probe;
use crate::status::CompositeStatus;
use futures_util::FutureExt;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("monitor worker is not running")]
    WorkerStopped,

    #[error("status check failed: {0}")]
    CycleFailed(String),
}

/// How a single check ended.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Completed(Arc<CompositeStatus>),
    Failed(BridgeError),
}

/// Where a check is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Dispatched,
    Completed,
    Failed,
}

type Callback = Box<dyn FnOnce(CheckOutcome) + Send>;

/// Completion slot shared by a handle and the worker.
struct Slot {
    state: Mutex<SlotState>,
    done: Condvar,
}

struct SlotState {
    outcome: Option<CheckOutcome>,
    callback: Option<(ControlSender, Callback)>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                outcome: None,
                callback: None,
            }),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, outcome: CheckOutcome) {
        let callback = {
            let mut state = self.lock();
            state.outcome = Some(outcome.clone());
            state.callback.take()
        };
        self.done.notify_all();

        if let Some((control, callback)) = callback {
            post_callback(&control, callback, outcome);
        }
    }
}

fn post_callback(control: &ControlSender, callback: Callback, outcome: CheckOutcome) {
    if !control.post(move || callback(outcome)) {
        debug!("control queue closed, dropping check callback");
    }
}

/// The eventual result of one triggered check.
pub struct CheckHandle {
    id: u64,
    slot: Arc<Slot>,
}

impl CheckHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> CheckState {
        match &self.slot.lock().outcome {
            None => CheckState::Dispatched,
            Some(CheckOutcome::Completed(_)) => CheckState::Completed,
            Some(CheckOutcome::Failed(_)) => CheckState::Failed,
        }
    }

    /// The outcome if the check has finished.
    pub fn try_outcome(&self) -> Option<CheckOutcome> {
        self.slot.lock().outcome.clone()
    }

    /// Block until the check finishes.
    pub fn wait(self) -> CheckOutcome {
        let mut state = self.slot.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = self.slot.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`; `None` if the check is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CheckOutcome> {
        let state = self.slot.lock();
        let (state, _) = self
            .slot
            .done
            .wait_timeout_while(state, timeout, |s| s.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.outcome.clone()
    }

    /// Run `callback` with the outcome on the thread that pumps `control`.
    ///
    /// If the check already finished the callback is posted right away.
    pub fn on_complete<F>(self, control: &ControlSender, callback: F)
    where
        F: FnOnce(CheckOutcome) + Send + 'static,
    {
        let mut state = self.slot.lock();
        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                post_callback(control, Box::new(callback), outcome);
            }
            None => state.callback = Some((control.clone(), Box::new(callback))),
        }
    }
}

struct CheckRequest {
    id: u64,
    slot: Arc<Slot>,
}

/// Runs status cycles on a dedicated worker thread.
pub struct SchedulerBridge {
    requests: Option<mpsc::UnboundedSender<CheckRequest>>,
    worker: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
}

impl SchedulerBridge {
    /// Start the worker with `aggregator` behind `cache`.
    pub fn spawn<P, S>(aggregator: StatusAggregator<P, S>, cache: StatusCache) -> io::Result<Self>
    where
        P: Probe + 'static,
        S: PopulationStore + 'static,
    {
        let aggregator = Arc::new(aggregator);
        let cache = Arc::new(cache);
        Self::spawn_with(move || {
            let aggregator = Arc::clone(&aggregator);
            let cache = Arc::clone(&cache);
            async move { cache.get_or_compute(|| aggregator.compute()).await }
        })
    }

    /// Start the worker with an arbitrary cycle. Each check awaits one call.
    pub fn spawn_with<F, Fut>(mut cycle: F) -> io::Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Arc<CompositeStatus>> + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<CheckRequest>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = thread::Builder::new()
            .name("realmwatch-worker".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    info!("monitor worker started");
                    while let Some(request) = rx.recv().await {
                        let outcome = match AssertUnwindSafe(async { cycle().await }).catch_unwind().await {
                            Ok(status) => CheckOutcome::Completed(status),
                            Err(panic) => {
                                let reason = panic_message(panic.as_ref());
                                error!(check_id = request.id, error = %reason, "status check panicked");
                                CheckOutcome::Failed(BridgeError::CycleFailed(reason))
                            }
                        };
                        debug!(check_id = request.id, "status check finished");
                        request.slot.complete(outcome);
                    }
                    info!("monitor worker stopped");
                });
            })?;

        Ok(Self {
            requests: Some(tx),
            worker: Some(worker),
            next_id: AtomicU64::new(1),
        })
    }

    /// Submit a check; returns immediately.
    pub fn trigger_check(&self) -> CheckHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot::new());
        let handle = CheckHandle {
            id,
            slot: Arc::clone(&slot),
        };

        let request = CheckRequest { id, slot };
        let rejected = match &self.requests {
            Some(tx) => tx.send(request).err().map(|mpsc::error::SendError(request)| request),
            None => Some(request),
        };
        if let Some(request) = rejected {
            error!(check_id = id, "monitor worker gone, check failed");
            request.slot.complete(CheckOutcome::Failed(BridgeError::WorkerStopped));
        }

        handle
    }
}

impl Drop for SchedulerBridge {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued checks finish.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("monitor worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlQueue;
    use crate::status::RealmInfo;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn snapshot(players: u32) -> Arc<CompositeStatus> {
        Arc::new(CompositeStatus::new(true, true, players, &RealmInfo::default()))
    }

    #[test]
    fn test_check_completes_with_status() {
        let bridge = SchedulerBridge::spawn_with(|| async { snapshot(12) }).unwrap();

        let handle = bridge.trigger_check();
        match handle.wait() {
            CheckOutcome::Completed(status) => assert_eq!(status.players_online(), 12),
            CheckOutcome::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[test]
    fn test_state_moves_from_dispatched_to_completed() {
        let bridge = SchedulerBridge::spawn_with(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            snapshot(1)
        })
        .unwrap();

        let handle = bridge.trigger_check();
        assert_eq!(handle.state(), CheckState::Dispatched);
        assert!(handle.try_outcome().is_none());
        assert!(handle.wait_timeout(Duration::from_secs(2)).is_some());
        assert_eq!(handle.state(), CheckState::Completed);
    }

    #[test]
    fn test_panicking_cycle_fails_and_worker_survives() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let bridge = SchedulerBridge::spawn_with(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("database driver exploded");
                }
                snapshot(3)
            }
        })
        .unwrap();

        let first = bridge.trigger_check();
        assert!(matches!(
            first.wait(),
            CheckOutcome::Failed(BridgeError::CycleFailed(msg)) if msg == "database driver exploded"
        ));

        let second = bridge.trigger_check();
        assert!(matches!(second.wait(), CheckOutcome::Completed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_checks_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let bridge = SchedulerBridge::spawn_with(move || {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                snapshot(0)
            }
        })
        .unwrap();

        let handles: Vec<_> = (0..4).map(|_| bridge.trigger_check()).collect();
        let ids: Vec<u64> = handles.iter().map(CheckHandle::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        for handle in handles {
            assert!(matches!(handle.wait(), CheckOutcome::Completed(_)));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_runs_on_control_thread() {
        let bridge = SchedulerBridge::spawn_with(|| async { snapshot(5) }).unwrap();
        let queue = ControlQueue::new();
        let (tx, rx) = std::sync::mpsc::channel();

        bridge.trigger_check().on_complete(&queue.sender(), move |outcome| {
            tx.send((std::thread::current().id(), outcome)).unwrap();
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        let (thread_id, outcome) = loop {
            let _ = queue.pump_until(Instant::now() + Duration::from_millis(10));
            if let Ok(seen) = rx.try_recv() {
                break seen;
            }
            assert!(Instant::now() < deadline, "callback never ran");
        };
        assert_eq!(thread_id, std::thread::current().id());
        assert!(matches!(outcome, CheckOutcome::Completed(s) if s.players_online() == 5));
    }

    #[test]
    fn test_callback_registered_after_completion_still_posts() {
        let bridge = SchedulerBridge::spawn_with(|| async { snapshot(8) }).unwrap();
        let queue = ControlQueue::new();
        let handle = bridge.trigger_check();
        assert!(handle.wait_timeout(Duration::from_secs(2)).is_some());

        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        handle.on_complete(&queue.sender(), move |outcome| {
            if let CheckOutcome::Completed(status) = outcome {
                sink.store(status.players_online() as usize, Ordering::SeqCst);
            }
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        let _ = queue.pump();
        assert_eq!(seen.load(Ordering::SeqCst), 8);
    }
}
