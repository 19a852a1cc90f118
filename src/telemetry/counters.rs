//! Gateway request counters and point-in-time snapshots.
//!
//! One [`GatewayMetrics`] is constructed per manager and shared with its
//! workers. Each counter is written only by the component that owns the
//! event and can be read concurrently.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::recorders as facade;
use crate::admission::CircuitState;

/// Monotonic request counters.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    submitted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    circuit_open_count: AtomicU64,
    timed_out: AtomicU64,
    expired_in_queue: AtomicU64,
    cancelled: AtomicU64,
    aborted: AtomicU64,
}

/// Plain copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    pub submitted: u64,
    pub processed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub circuit_open_count: u64,
    pub timed_out: u64,
    pub expired_in_queue: u64,
    pub cancelled: u64,
    pub aborted: u64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self, queue_depth: usize) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        facade::record_request_submitted(queue_depth);
    }

    /// Queue was at capacity.
    pub fn record_queue_full(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        facade::record_request_rejected("queue_full");
    }

    /// Breaker refused the request, at admission or at dispatch.
    pub fn record_circuit_open(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.circuit_open_count.fetch_add(1, Ordering::Relaxed);
        facade::record_request_rejected("circuit_open");
    }

    pub fn record_processed(&self, latency_ms: u64, queue_wait_ms: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        facade::record_request_success(latency_ms, queue_wait_ms);
    }

    pub fn record_failed(&self, panicked: bool) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        facade::record_request_failure(panicked);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        facade::record_request_timeout(false);
    }

    pub fn record_expired_in_queue(&self) {
        self.expired_in_queue.fetch_add(1, Ordering::Relaxed);
        facade::record_request_timeout(true);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        facade::record_request_cancelled();
    }

    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
        facade::record_request_aborted();
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> RequestCounters {
        RequestCounters {
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            circuit_open_count: self.circuit_open_count.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            expired_in_queue: self.expired_in_queue.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counters and live scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub counters: RequestCounters,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub available_tokens: f64,
    pub circuit_state: CircuitState,
    pub circuit_failure_count: u32,
    pub active_workers: usize,
    pub sweeper_running: bool,
}
