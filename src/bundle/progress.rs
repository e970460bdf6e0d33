//! Shared progress counters and observer notification.
//!
//! [`ProgressState`] is owned by one pipeline run and handed to each worker
//! behind an `Arc`. Every mutation happens under one mutex so that a
//! [`ProgressSnapshot`] is always internally consistent.
//!
//! Observers never read the shared state directly. After each completion or
//! failure the worker takes a snapshot and pushes it into an unbounded
//! channel; a dispatch task drains the channel and invokes the callback. A
//! slow callback therefore delays later notifications, never a worker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use super::constants::IN_FLIGHT_WINDOW;

/// Callback invoked with a snapshot after every completion or failure.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Point-in-time copy of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Attachments fetched and archived so far.
    pub completed: usize,
    /// Attachments that failed so far.
    pub failed: usize,
    /// Attachments in the run.
    pub total: usize,
    /// Display names of the most recently started fetches still in flight,
    /// oldest first.
    pub in_flight: Vec<String>,
}

impl ProgressSnapshot {
    /// Completed plus failed.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    /// Whether every attachment has reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.finished() >= self.total
    }
}

#[derive(Debug)]
struct ProgressInner {
    completed: usize,
    failed: usize,
    in_flight: VecDeque<String>,
}

/// Run-scoped progress counters.
#[derive(Debug)]
pub struct ProgressState {
    total: usize,
    inner: Mutex<ProgressInner>,
}

impl ProgressState {
    /// Creates counters for a run of `total` attachments.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            inner: Mutex::new(ProgressInner {
                completed: 0,
                failed: 0,
                in_flight: VecDeque::with_capacity(IN_FLIGHT_WINDOW),
            }),
        }
    }

    /// Total fixed at run start.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Records that a fetch for `name` started.
    ///
    /// The window keeps the last [`IN_FLIGHT_WINDOW`] names; older names are
    /// dropped from display even if their fetch is still running.
    pub fn mark_started(&self, name: &str) {
        let mut inner = self.lock();
        if inner.in_flight.len() == IN_FLIGHT_WINDOW {
            inner.in_flight.pop_front();
        }
        inner.in_flight.push_back(name.to_string());
    }

    /// Records a success and returns the resulting snapshot.
    pub fn record_success(&self, name: &str) -> ProgressSnapshot {
        let mut inner = self.lock();
        inner.completed += 1;
        Self::finish_in_flight(&mut inner, name);
        self.snapshot_of(&inner)
    }

    /// Records a failure and returns the resulting snapshot.
    pub fn record_failure(&self, name: &str) -> ProgressSnapshot {
        let mut inner = self.lock();
        inner.failed += 1;
        Self::finish_in_flight(&mut inner, name);
        self.snapshot_of(&inner)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.lock();
        self.snapshot_of(&inner)
    }

    fn finish_in_flight(inner: &mut ProgressInner, name: &str) {
        if let Some(pos) = inner.in_flight.iter().position(|n| n == name) {
            inner.in_flight.remove(pos);
        }
    }

    fn snapshot_of(&self, inner: &ProgressInner) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: inner.completed,
            failed: inner.failed,
            total: self.total,
            in_flight: inner.in_flight.iter().cloned().collect(),
        }
    }

    // Counters stay valid even if a holder panicked mid-update; nothing
    // inside the lock can be left half-written.
    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-blocking hand-off from workers to the progress callback.
#[derive(Clone)]
pub(crate) struct ProgressNotifier {
    sender: Option<mpsc::UnboundedSender<ProgressSnapshot>>,
}

impl fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("active", &self.sender.is_some())
            .finish()
    }
}

impl ProgressNotifier {
    /// Notifier that drops every snapshot.
    pub(crate) fn disabled() -> Self {
        Self { sender: None }
    }

    /// Spawns the dispatch thread for `callback`.
    ///
    /// The callback runs on the blocking pool, so a slow callback never
    /// stalls a runtime worker. The thread ends once every notifier clone is
    /// dropped and the queue is drained.
    pub(crate) fn spawn(callback: ProgressCallback) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressSnapshot>();
        tokio::task::spawn_blocking(move || {
            while let Some(snapshot) = receiver.blocking_recv() {
                callback(snapshot);
            }
            trace!("progress dispatch finished");
        });
        Self {
            sender: Some(sender),
        }
    }

    /// Queues a snapshot; never waits.
    pub(crate) fn notify(&self, snapshot: ProgressSnapshot) {
        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening any more.
            let _ = sender.send(snapshot);
        }
    }
}
