//! The control thread: periodic triggers and callback marshaling.
//!
//! Work posted through a [`ControlSender`] runs only when the thread that
//! owns the [`ControlQueue`] pumps it, which gives status consumers the
//! thread affinity a non thread-safe presentation layer needs.

use crate::board::StatusBoard;
use crate::bridge::SchedulerBridge;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shortest interval the control loop will tick at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

type Task = Box<dyn FnOnce() + Send>;

enum ControlMessage {
    Run(Task),
    Stop,
}

/// Posts work to the control thread. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct ControlSender {
    tx: Sender<ControlMessage>,
}

impl ControlSender {
    /// Queue `task` for the control thread. Returns false once the queue is gone.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(ControlMessage::Run(Box::new(task))).is_ok()
    }

    /// Ask the control loop to exit after the work queued before this call.
    pub fn stop(&self) -> bool {
        self.tx.send(ControlMessage::Stop).is_ok()
    }
}

/// Inbox of the control thread.
pub struct ControlQueue {
    rx: Receiver<ControlMessage>,
    tx: Sender<ControlMessage>,
}

impl ControlQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rx, tx }
    }

    pub fn sender(&self) -> ControlSender {
        ControlSender {
            tx: self.tx.clone(),
        }
    }

    /// Run everything already queued without waiting.
    pub fn pump(&self) -> ControlFlow<()> {
        loop {
            match self.rx.try_recv() {
                Ok(ControlMessage::Run(task)) => task(),
                Ok(ControlMessage::Stop) => return ControlFlow::Break(()),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return ControlFlow::Continue(());
                }
            }
        }
    }

    /// Run queued work as it arrives until a stop request.
    pub fn pump_forever(&self) -> ControlFlow<()> {
        while let Ok(message) = self.rx.recv() {
            match message {
                ControlMessage::Run(task) => task(),
                ControlMessage::Stop => return ControlFlow::Break(()),
            }
        }
        ControlFlow::Break(())
    }

    /// Run queued work as it arrives until `deadline` or a stop request.
    pub fn pump_until(&self, deadline: Instant) -> ControlFlow<()> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.pump();
            }
            match self.rx.recv_timeout(remaining) {
                Ok(ControlMessage::Run(task)) => task(),
                Ok(ControlMessage::Stop) => return ControlFlow::Break(()),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return ControlFlow::Continue(());
                }
            }
        }
    }
}

impl Default for ControlQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive status checks from the calling thread until a stop request.
///
/// A check is triggered immediately and then once per `interval`,
/// independent of how earlier checks ended. Results are applied to `board`
/// on this thread. Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
pub fn run_control_loop(
    bridge: &SchedulerBridge,
    board: Arc<StatusBoard>,
    interval: Duration,
    queue: &ControlQueue,
) {
    if interval < MIN_POLL_INTERVAL {
        warn!(requested = ?interval, using = ?MIN_POLL_INTERVAL, "poll interval too short, raised");
    }
    let interval = interval.max(MIN_POLL_INTERVAL);
    info!(interval_secs = interval.as_secs_f64(), "control loop starting");
    let sender = queue.sender();
    let mut next_tick = Some(Instant::now());

    loop {
        let board = Arc::clone(&board);
        let handle = bridge.trigger_check();
        debug!(check_id = handle.id(), "status check triggered");
        handle.on_complete(&sender, move |outcome| board.apply(outcome));

        // Past the end of representable time: no further ticks.
        next_tick = next_tick.and_then(|tick| tick.checked_add(interval));
        let flow = match next_tick {
            Some(tick) => queue.pump_until(tick),
            None => queue.pump_forever(),
        };
        if flow.is_break() {
            break;
        }
    }

    info!("control loop stopped");
}
