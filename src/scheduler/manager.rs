//! Request manager facade.
//!
//! Owns the admission queue, token bucket, circuit breaker and counters, and
//! the lifecycle of the worker pool that drains the queue. Submission never
//! waits: a full queue or an open breaker is an immediate rejection.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use super::priority::Priority;
use super::queue::AdmissionQueue;
use super::queued_request::{QueuedRequest, RequestHandle, RequestId};
use super::worker::{self, SchedulerCore};
use crate::admission::{CircuitBreaker, TokenBucket};
use crate::config::GatewayConfig;
use crate::error::{BoxError, GatewayError};
use crate::health::{HealthChecker, HealthReport};
use crate::shutdown::{ShutdownResult, ShutdownSignal, ShutdownState, WorkerTracker};
use crate::telemetry::{GatewayMetrics, MetricsSnapshot};

/// Time allowed for running payloads to observe the force token before
/// their workers are aborted.
const FORCE_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Per-request submission options.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: Priority,
    /// Deadline counted from submission. Falls back to the manager's
    /// `default_timeout` when unset.
    pub timeout: Option<Duration>,
    /// Label used in logs and spans.
    pub name: Option<String>,
}

impl SubmitOptions {
    pub fn new(priority: Priority) -> Self {
        Self { priority, ..Default::default() }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<Priority> for SubmitOptions {
    fn from(priority: Priority) -> Self {
        Self::new(priority)
    }
}

/// One started generation of workers.
struct RunningState {
    signal: ShutdownSignal,
    workers: JoinSet<()>,
    sweeper: Option<JoinHandle<()>>,
}

/// Gateway request admission and scheduling facade.
pub struct RequestManager {
    core: Arc<SchedulerCore>,
    config: GatewayConfig,
    health: HealthChecker,
    tracker: WorkerTracker,
    next_id: AtomicU64,
    state: Mutex<ShutdownState>,
    running: Mutex<Option<RunningState>>,
}

impl RequestManager {
    /// Create a stopped manager with its own counter block.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_metrics(config, Arc::new(GatewayMetrics::new()))
    }

    /// Create a stopped manager that records into `metrics`.
    pub fn with_metrics(config: GatewayConfig, metrics: Arc<GatewayMetrics>) -> Self {
        let core = Arc::new(SchedulerCore {
            queue: AdmissionQueue::new(config.admission_queue()),
            limiter: TokenBucket::new(config.token_bucket()),
            breaker: CircuitBreaker::new(config.circuit_breaker()),
            metrics,
        });
        Self {
            core,
            health: HealthChecker::new(config.health.clone()),
            config,
            tracker: WorkerTracker::new(),
            next_id: AtomicU64::new(1),
            state: Mutex::new(ShutdownState::Stopped),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.lock()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.core.breaker
    }

    /// Spawn the worker pool and, when enabled, the queue sweeper.
    ///
    /// Must be called from within a Tokio runtime. Calling it while the
    /// manager is running or draining logs a warning and does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock();
        let mut state = self.state.lock();
        if *state != ShutdownState::Stopped || running.is_some() {
            tracing::warn!(state = ?*state, "request manager already started");
            return;
        }

        let signal = ShutdownSignal::new();
        let worker_count = self.config.concurrent_workers.max(1);
        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(worker::run_worker(
                worker_id,
                Arc::clone(&self.core),
                signal.clone(),
                self.tracker.track(),
            ));
        }

        let sweeper = (!self.config.cleanup_interval.is_zero()).then(|| {
            worker::spawn_sweeper(Arc::clone(&self.core), self.config.cleanup_interval, signal.clone())
        });

        *running = Some(RunningState { signal, workers, sweeper });
        *state = ShutdownState::Running;
        tracing::info!(
            workers = worker_count,
            queue_capacity = self.core.queue.capacity(),
            rate_limit = self.config.rate_limit,
            "request manager started"
        );
    }

    /// Submit a payload at `priority`.
    pub fn submit<F, Fut, T, E>(&self, payload: F, priority: Priority) -> Result<RequestHandle<T>, GatewayError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.submit_with(payload, SubmitOptions::new(priority))
    }

    /// Submit a payload with explicit options.
    ///
    /// Fails fast with `CircuitOpen` when the breaker is open and with
    /// `QueueFull` when the queue is at capacity; nothing is queued in
    /// either case. A manager that is draining refuses new work with
    /// `ShutdownAborted`.
    ///
    /// The draining check and the enqueue are not atomic with `stop`: a
    /// submit racing the final queue drain may land in a stopped manager,
    /// where it waits for the next `start` like any submit made while
    /// stopped, or resolves `ShutdownAborted` when the manager is dropped.
    pub fn submit_with<F, Fut, T, E>(
        &self,
        payload: F,
        options: SubmitOptions,
    ) -> Result<RequestHandle<T>, GatewayError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        if self.state() == ShutdownState::Draining {
            return Err(GatewayError::ShutdownAborted);
        }
        if self.core.breaker.is_open() {
            self.core.metrics.record_circuit_open();
            tracing::warn!(priority = %options.priority, "submit rejected: circuit open");
            return Err(GatewayError::CircuitOpen);
        }

        let id = self.next_request_id();
        let timeout = options.timeout.or(self.config.default_timeout);
        let name = options.name.unwrap_or_else(|| format!("request-{id}"));
        let (request, handle) = QueuedRequest::new(id, name, options.priority, timeout, payload);

        match self.core.queue.try_push(request) {
            Ok(depth) => {
                self.core.metrics.record_submitted(depth);
                tracing::debug!(request_id = id, priority = %options.priority, depth, "request queued");
                Ok(handle)
            }
            Err(_) => {
                let capacity = self.core.queue.capacity();
                self.core.metrics.record_queue_full();
                tracing::warn!(request_id = id, capacity, "submit rejected: queue full");
                Err(GatewayError::QueueFull { capacity })
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Stop the worker pool.
    ///
    /// Workers get `timeout` to finish their current request and exit. If
    /// they do not, running payloads are aborted through the force token
    /// and stragglers are torn down after a short grace period. Every
    /// request still queued when the workers are gone is resolved with
    /// `ShutdownAborted` before this returns.
    pub async fn stop(&self, timeout: Duration) -> ShutdownResult {
        let Some(mut running) = self.running.lock().take() else {
            tracing::warn!("stop called on a request manager that is not running");
            return ShutdownResult::NotRunning;
        };
        *self.state.lock() = ShutdownState::Draining;
        let aborted_before = self.core.metrics.aborted();
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "stopping request manager");

        running.signal.request_stop();
        self.core.queue.wake_all();

        let graceful = join_until(&mut running.workers, Instant::now() + timeout).await;
        if !graceful {
            tracing::warn!(
                remaining = running.workers.len(),
                "workers did not stop in time; aborting in-flight requests"
            );
            running.signal.force();
            if !join_until(&mut running.workers, Instant::now() + FORCE_GRACE_PERIOD).await {
                running.workers.abort_all();
                while running.workers.join_next().await.is_some() {}
            }
        }
        if let Some(sweeper) = running.sweeper.take() {
            sweeper.abort();
            let _ = sweeper.await;
        }

        let leftovers = self.core.queue.drain();
        if !leftovers.is_empty() {
            tracing::warn!(count = leftovers.len(), "resolving queued requests as aborted");
        }
        for request in leftovers {
            self.core.metrics.record_aborted();
            request.reject(GatewayError::ShutdownAborted);
        }
        crate::telemetry::record_queue_depth(0);

        *self.state.lock() = ShutdownState::Stopped;
        let aborted = self.core.metrics.aborted().saturating_sub(aborted_before);
        tracing::info!(graceful, aborted, "request manager stopped");
        if graceful {
            ShutdownResult::Complete { aborted }
        } else {
            ShutdownResult::Forced { aborted }
        }
    }

    /// Stop using the configured `stop_timeout`.
    pub async fn shutdown(&self) -> ShutdownResult {
        self.stop(self.config.stop_timeout).await
    }

    /// Point-in-time snapshot of counters and scheduler state.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let sweeper_running = self
            .running
            .lock()
            .as_ref()
            .and_then(|r| r.sweeper.as_ref())
            .map_or(false, |h| !h.is_finished());
        MetricsSnapshot {
            counters: self.core.metrics.counters(),
            queue_size: self.core.queue.len(),
            queue_capacity: self.core.queue.capacity(),
            available_tokens: self.core.limiter.available(),
            circuit_state: self.core.breaker.state(),
            circuit_failure_count: self.core.breaker.failure_count(),
            active_workers: self.tracker.active(),
            sweeper_running,
        }
    }

    pub fn health_check(&self) -> HealthReport {
        self.health.report(&self.get_metrics())
    }
}

/// Join workers until the set is empty or `deadline` passes. Returns
/// whether every worker exited.
async fn join_until(workers: &mut JoinSet<()>, deadline: Instant) -> bool {
    loop {
        match tokio::time::timeout_at(deadline, workers.join_next()).await {
            Ok(Some(Ok(()))) => {}
            Ok(Some(Err(err))) => {
                if err.is_panic() {
                    tracing::error!(error = %err, "worker task panicked");
                }
            }
            Ok(None) => return true,
            Err(_) => return false,
        }
    }
}

impl Drop for RequestManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.signal.force();
            if let Some(sweeper) = running.sweeper {
                sweeper.abort();
            }
            // Dropping the set aborts the workers; their queued requests
            // resolve as aborted when the queue is dropped.
        }
    }
}
