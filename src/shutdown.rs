//! Lifecycle state and shutdown signalling for the request manager.
//!
//! Stopping is two-phase: the graceful token asks workers to finish their
//! current request and exit; the force token makes every running payload
//! give up and resolve its handle with `ShutdownAborted`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Manager lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Stopped,
    Running,
    Draining,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownResult {
    /// The manager was not running.
    NotRunning,
    /// All workers exited within the timeout.
    Complete { aborted: u64 },
    /// The timeout expired and in-flight work was aborted.
    Forced { aborted: u64 },
}

impl ShutdownResult {
    /// Requests resolved with `ShutdownAborted` by this stop.
    pub fn aborted(&self) -> u64 {
        match self {
            Self::NotRunning => 0,
            Self::Complete { aborted } | Self::Forced { aborted } => *aborted,
        }
    }
}

/// Cancellation tokens shared by one generation of workers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    graceful: CancellationToken,
    force: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask workers to stop picking up new work.
    pub fn request_stop(&self) {
        self.graceful.cancel();
    }

    /// Abort running payloads. Implies a stop request.
    pub fn force(&self) {
        self.graceful.cancel();
        self.force.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.graceful.is_cancelled()
    }

    pub fn graceful_token(&self) -> &CancellationToken {
        &self.graceful
    }

    pub fn force_token(&self) -> &CancellationToken {
        &self.force
    }
}

/// Counts live worker loops.
#[derive(Debug, Clone, Default)]
pub struct WorkerTracker {
    alive: Arc<AtomicUsize>,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live worker; the slot is released when the guard drops,
    /// including when the worker task is aborted.
    pub fn track(&self) -> WorkerGuard {
        self.alive.fetch_add(1, Ordering::SeqCst);
        WorkerGuard { alive: Arc::clone(&self.alive) }
    }

    pub fn active(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }
}

/// RAII guard for a live worker loop.
pub struct WorkerGuard {
    alive: Arc<AtomicUsize>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_implies_stop() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_stopping());
        signal.force();
        assert!(signal.is_stopping());
        assert!(signal.force_token().is_cancelled());
    }

    #[test]
    fn stop_does_not_force() {
        let signal = ShutdownSignal::new();
        signal.request_stop();
        assert!(signal.graceful_token().is_cancelled());
        assert!(!signal.force_token().is_cancelled());
    }

    #[test]
    fn tracker_counts_guards() {
        let tracker = WorkerTracker::new();
        let g1 = tracker.track();
        let g2 = tracker.track();
        assert_eq!(tracker.active(), 2);
        drop(g1);
        assert_eq!(tracker.active(), 1);
        drop(g2);
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn aborted_count_by_result() {
        assert_eq!(ShutdownResult::NotRunning.aborted(), 0);
        assert_eq!(ShutdownResult::Forced { aborted: 3 }.aborted(), 3);
    }
}
