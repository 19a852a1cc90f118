//! Worker loop: dequeue, wait for a rate token, execute inside the breaker.
//!
//! Every request a worker takes off the queue is either executed once,
//! put back before execution began, or resolved with an error. A failing
//! or panicking payload never ends the loop; only shutdown does.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use super::queue::{AdmissionQueue, QueueEntry};
use super::queued_request::{JobOutcome, QueuedRequest};
use crate::admission::{CircuitBreaker, TokenBucket};
use crate::error::GatewayError;
use crate::shutdown::{ShutdownSignal, WorkerGuard};
use crate::telemetry::{GatewayMetrics, RequestSpan};

/// How long an idle worker waits on the queue before re-checking shutdown.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Structures shared by all workers of one manager.
pub struct SchedulerCore {
    pub queue: AdmissionQueue,
    pub limiter: TokenBucket,
    pub breaker: CircuitBreaker,
    pub metrics: Arc<GatewayMetrics>,
}

/// One worker loop. Runs until the graceful token fires; the guard keeps
/// the worker counted as alive for as long as the loop runs.
pub async fn run_worker(
    worker_id: usize,
    core: Arc<SchedulerCore>,
    signal: ShutdownSignal,
    guard: WorkerGuard,
) {
    let _guard = guard;
    tracing::info!(worker_id, "worker started");
    let graceful = signal.graceful_token();

    loop {
        if graceful.is_cancelled() {
            break;
        }
        let entry = tokio::select! {
            biased;
            () = graceful.cancelled() => break,
            entry = core.queue.pop_timeout(IDLE_POLL_INTERVAL) => entry,
        };
        let Some(entry) = entry else { continue };

        if let Some(request) = screen(&core, entry.item) {
            let entry = QueueEntry { item: request, ..entry };
            if !core.limiter.acquire(graceful).await {
                return_or_abort(&core, entry);
                break;
            }
            tracing::debug!(
                worker_id,
                request_id = entry.item.id,
                queue_len = core.queue.len(),
                "dispatching request"
            );
            execute(worker_id, &core, entry.item, &signal).await;
        }
    }

    tracing::info!(worker_id, "worker stopped");
}

/// Resolve requests that must not run. Returns the request if it may.
fn screen(core: &SchedulerCore, request: QueuedRequest) -> Option<QueuedRequest> {
    if request.is_cancelled() {
        core.metrics.record_cancelled();
        request.reject(GatewayError::Cancelled);
        return None;
    }
    if request.is_expired() {
        core.metrics.record_expired_in_queue();
        let timeout = request.timeout.unwrap_or_default();
        tracing::warn!(request_id = request.id, "request expired in queue");
        request.reject(GatewayError::Timeout { timeout, expired_in_queue: true });
        return None;
    }
    Some(request)
}

/// Shutdown arrived while waiting for a token: hand the request back, or
/// resolve it if there is no room.
fn return_or_abort(core: &SchedulerCore, entry: QueueEntry) {
    if let Err(request) = core.queue.requeue(entry) {
        tracing::warn!(request_id = request.id, "no room to requeue during shutdown");
        core.metrics.record_aborted();
        request.reject(GatewayError::ShutdownAborted);
    }
}

/// Counts a running request as aborted if its worker task is torn down
/// before the payload returns. The result sender is dropped with the task,
/// so the handle already resolves `ShutdownAborted`.
struct InFlight<'a> {
    metrics: &'a GatewayMetrics,
    request_id: u64,
    running: bool,
}

impl<'a> InFlight<'a> {
    fn new(metrics: &'a GatewayMetrics, request_id: u64) -> Self {
        Self { metrics, request_id, running: true }
    }

    fn finished(mut self) {
        self.running = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.running {
            self.metrics.record_aborted();
            tracing::warn!(request_id = self.request_id, "worker torn down mid-request");
        }
    }
}

async fn execute(worker_id: usize, core: &SchedulerCore, request: QueuedRequest, signal: &ShutdownSignal) {
    let span = RequestSpan::new(request.id, &request.name, request.priority, worker_id);
    let request_span = span.clone();

    async move {
        let permit = match core.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                core.metrics.record_circuit_open();
                request_span.record("status", "circuit_open");
                tracing::warn!("circuit open; request rejected at dispatch");
                request.reject(GatewayError::CircuitOpen);
                return;
            }
        };

        let queue_wait_ms = request.enqueued_at.elapsed().as_millis() as u64;
        let start = Instant::now();
        let in_flight = InFlight::new(&core.metrics, request.id);
        let completion = request.run(signal.force_token().clone()).await;
        in_flight.finished();
        let latency_ms = start.elapsed().as_millis() as u64;
        request_span.record("queue_wait_ms", queue_wait_ms);
        request_span.record("latency_ms", latency_ms);

        match &completion.outcome {
            JobOutcome::Succeeded => {
                permit.success();
                core.metrics.record_processed(latency_ms, queue_wait_ms);
                request_span.record("status", "ok");
            }
            JobOutcome::Failed { message, panicked } => {
                permit.failure();
                core.metrics.record_failed(*panicked);
                request_span.record("status", "error");
                request_span.record("error.message", message.as_str());
                if *panicked {
                    tracing::error!(error = %message, "payload panicked");
                } else {
                    tracing::debug!(error = %message, "payload failed");
                }
            }
            JobOutcome::Cancelled => {
                drop(permit);
                core.metrics.record_cancelled();
                request_span.record("status", "cancelled");
            }
            JobOutcome::TimedOut => {
                drop(permit);
                core.metrics.record_timed_out();
                request_span.record("status", "timeout");
                tracing::warn!(latency_ms, "request execution timed out");
            }
            JobOutcome::Aborted => {
                drop(permit);
                core.metrics.record_aborted();
                request_span.record("status", "aborted");
            }
        }
        completion.deliver();
    }
    .instrument(span)
    .await
}

/// Spawn the background task that removes expired and cancelled requests
/// from the queue every `interval`.
pub fn spawn_sweeper(core: Arc<SchedulerCore>, interval: Duration, signal: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_ms = interval.as_millis() as u64, "queue sweeper started");
        let graceful = signal.graceful_token();
        loop {
            tokio::select! {
                biased;
                () = graceful.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let swept = sweep(&core);
            if swept > 0 {
                tracing::info!(swept, "removed expired or cancelled requests from queue");
            }
        }
        tracing::info!("queue sweeper stopped");
    })
}

/// Resolve and remove every queued request that can no longer run.
pub fn sweep(core: &SchedulerCore) -> usize {
    let removed = core.queue.remove_where(|r| r.is_cancelled() || r.is_expired());
    let count = removed.len();
    for request in removed {
        // Cancellation wins over expiry, matching the dispatch-time check.
        let _ = screen(core, request);
    }
    if count > 0 {
        crate::telemetry::record_queue_depth(core.queue.len());
    }
    count
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
