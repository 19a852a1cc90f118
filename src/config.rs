//! Gateway configuration loading from environment variables.
//!
//! All values are loaded from `GATEWAY_*` environment variables with
//! sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GATEWAY_RATE_LIMIT` | 10.0 | Dispatch rate (permits/sec) |
//! | `GATEWAY_BUCKET_CAPACITY` | 20.0 | Token bucket burst size |
//! | `GATEWAY_BREAKER_FAIL_MAX` | 5 | Consecutive failures before opening |
//! | `GATEWAY_BREAKER_RESET_SECS` | 60 | Open duration before a probe |
//! | `GATEWAY_MAX_QUEUE_SIZE` | 1000 | Admission queue capacity |
//! | `GATEWAY_WORKERS` | 5 | Concurrent workers |
//! | `GATEWAY_STOP_TIMEOUT_SECS` | 5 | Graceful stop timeout (secs) |
//! | `GATEWAY_DEFAULT_TIMEOUT_MS` | unset | Per-request deadline (ms, 0 = none) |
//! | `GATEWAY_CLEANUP_INTERVAL_SECS` | 30 | Queue sweep interval (0 = off) |

use std::time::Duration;

use serde::Serialize;

use crate::admission::{CircuitBreakerConfig, TokenBucketConfig};
use crate::health::HealthConfig;
use crate::scheduler::AdmissionQueueConfig;

/// All gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub rate_limit: f64,
    pub bucket_capacity: f64,
    pub breaker_fail_max: u32,
    pub breaker_reset_timeout: Duration,
    pub max_queue_size: usize,
    pub concurrent_workers: usize,
    pub stop_timeout: Duration,
    /// Deadline applied to requests submitted without their own timeout.
    pub default_timeout: Option<Duration>,
    /// Sweeper period. Zero disables the sweeper.
    pub cleanup_interval: Duration,
    pub health: HealthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit: 10.0,
            bucket_capacity: 20.0,
            breaker_fail_max: 5,
            breaker_reset_timeout: Duration::from_secs(60),
            max_queue_size: 1000,
            concurrent_workers: 5,
            stop_timeout: Duration::from_secs(5),
            default_timeout: None,
            cleanup_interval: Duration::from_secs(30),
            health: HealthConfig::default(),
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub rate_limit: f64,
    pub bucket_capacity: f64,
    pub breaker_fail_max: u32,
    pub breaker_reset_timeout_secs: u64,
    pub max_queue_size: usize,
    pub concurrent_workers: usize,
    pub stop_timeout_secs: u64,
    pub default_timeout_ms: Option<u64>,
    pub cleanup_interval_secs: u64,
}

impl GatewayConfig {
    pub fn token_bucket(&self) -> TokenBucketConfig {
        TokenBucketConfig {
            rate: self.rate_limit,
            capacity: self.bucket_capacity,
        }
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            fail_max: self.breaker_fail_max,
            reset_timeout: self.breaker_reset_timeout,
        }
    }

    pub fn admission_queue(&self) -> AdmissionQueueConfig {
        AdmissionQueueConfig { max_size: self.max_queue_size }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            rate_limit: self.rate_limit,
            bucket_capacity: self.bucket_capacity,
            breaker_fail_max: self.breaker_fail_max,
            breaker_reset_timeout_secs: self.breaker_reset_timeout.as_secs(),
            max_queue_size: self.max_queue_size,
            concurrent_workers: self.concurrent_workers,
            stop_timeout_secs: self.stop_timeout.as_secs(),
            default_timeout_ms: self.default_timeout.map(|t| t.as_millis() as u64),
            cleanup_interval_secs: self.cleanup_interval.as_secs(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a finite `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> GatewayConfig {
    const MIN_RATE: f64 = 0.001;
    let defaults = GatewayConfig::default();

    let rate_limit = parse_f64("GATEWAY_RATE_LIMIT", defaults.rate_limit).max(MIN_RATE);
    let bucket_capacity = parse_f64("GATEWAY_BUCKET_CAPACITY", defaults.bucket_capacity).max(1.0);
    let breaker_fail_max = parse_u32("GATEWAY_BREAKER_FAIL_MAX", defaults.breaker_fail_max).max(1);
    let reset_secs = parse_u64("GATEWAY_BREAKER_RESET_SECS", defaults.breaker_reset_timeout.as_secs());
    let max_queue_size = parse_usize("GATEWAY_MAX_QUEUE_SIZE", defaults.max_queue_size).max(1);
    let concurrent_workers = parse_usize("GATEWAY_WORKERS", defaults.concurrent_workers).max(1);
    let stop_secs = parse_u64("GATEWAY_STOP_TIMEOUT_SECS", defaults.stop_timeout.as_secs());
    let timeout_ms = parse_u64("GATEWAY_DEFAULT_TIMEOUT_MS", 0);
    let cleanup_secs = parse_u64("GATEWAY_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval.as_secs());

    GatewayConfig {
        rate_limit,
        bucket_capacity,
        breaker_fail_max,
        breaker_reset_timeout: Duration::from_secs(reset_secs),
        max_queue_size,
        concurrent_workers,
        stop_timeout: Duration::from_secs(stop_secs),
        default_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        cleanup_interval: Duration::from_secs(cleanup_secs),
        health: defaults.health,
    }
}
