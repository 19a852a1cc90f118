//! Health reporting for the gateway.
//!
//! A gateway is healthy when its breaker is not open, its queue is below
//! the utilization threshold, and at least one worker is alive.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::admission::CircuitState;
use crate::telemetry::MetricsSnapshot;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub state: HealthState,
    pub circuit_state: CircuitState,
    pub queue_utilization: f64,
    pub active_workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_timed_out: u64,
    pub expired_in_queue: u64,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue fill ratio at or above which the gateway is degraded.
    pub max_queue_utilization: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { max_queue_utilization: 0.9 }
    }
}

/// Derives health from a metrics snapshot.
#[derive(Debug)]
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Generate full health report.
    pub fn report(&self, snapshot: &MetricsSnapshot) -> HealthReport {
        let queue_utilization = if snapshot.queue_capacity == 0 {
            0.0
        } else {
            snapshot.queue_size as f64 / snapshot.queue_capacity as f64
        };
        let state = self.compute_state(snapshot.circuit_state, queue_utilization, snapshot.active_workers);

        HealthReport {
            healthy: state == HealthState::Healthy,
            state,
            circuit_state: snapshot.circuit_state,
            queue_utilization,
            active_workers: snapshot.active_workers,
            total_processed: snapshot.counters.processed,
            total_failed: snapshot.counters.failed,
            total_timed_out: snapshot.counters.timed_out,
            expired_in_queue: snapshot.counters.expired_in_queue,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, circuit: CircuitState, utilization: f64, workers: usize) -> HealthState {
        if circuit == CircuitState::Open || workers == 0 {
            return HealthState::Unhealthy;
        }
        if utilization >= self.config.max_queue_utilization {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::RequestCounters;

    fn snapshot(queue_size: usize, circuit_state: CircuitState, active_workers: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: RequestCounters::default(),
            queue_size,
            queue_capacity: 10,
            available_tokens: 1.0,
            circuit_state,
            circuit_failure_count: 0,
            active_workers,
            sweeper_running: false,
        }
    }

    #[test]
    fn healthy_when_closed_with_room_and_workers() {
        let report = HealthChecker::default().report(&snapshot(3, CircuitState::Closed, 2));
        assert!(report.healthy);
        assert_eq!(report.state, HealthState::Healthy);
        assert!((report.queue_utilization - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn half_open_still_counts_as_healthy() {
        let report = HealthChecker::default().report(&snapshot(0, CircuitState::HalfOpen, 1));
        assert!(report.healthy);
    }

    #[test]
    fn open_breaker_is_unhealthy() {
        let report = HealthChecker::default().report(&snapshot(0, CircuitState::Open, 2));
        assert!(!report.healthy);
        assert_eq!(report.state, HealthState::Unhealthy);
    }

    #[test]
    fn no_workers_is_unhealthy() {
        let report = HealthChecker::default().report(&snapshot(0, CircuitState::Closed, 0));
        assert_eq!(report.state, HealthState::Unhealthy);
    }

    #[test]
    fn nearly_full_queue_is_degraded() {
        let report = HealthChecker::default().report(&snapshot(9, CircuitState::Closed, 2));
        assert!(!report.healthy);
        assert_eq!(report.state, HealthState::Degraded);
    }
}
