//! `metrics` facade recorders.
//!
//! These emit through whatever recorder the host application installs and
//! are no-ops otherwise. The authoritative counters live in
//! [`GatewayMetrics`](super::GatewayMetrics).

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const REQUESTS_SUBMITTED: &str = "gateway.requests.submitted";
pub const REQUESTS_PROCESSED: &str = "gateway.requests.processed";
pub const REQUESTS_FAILED: &str = "gateway.requests.failed";
pub const REQUESTS_REJECTED: &str = "gateway.requests.rejected";
pub const REQUESTS_TIMED_OUT: &str = "gateway.requests.timed_out";
pub const REQUESTS_CANCELLED: &str = "gateway.requests.cancelled";
pub const REQUESTS_ABORTED: &str = "gateway.requests.aborted";
pub const QUEUE_DEPTH: &str = "gateway.queue.depth";
pub const REQUEST_LATENCY: &str = "gateway.request.latency_ms";
pub const QUEUE_WAIT: &str = "gateway.request.queue_wait_ms";

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!(REQUESTS_SUBMITTED, "Requests admitted to the queue");
    describe_counter!(REQUESTS_PROCESSED, "Requests whose payload completed successfully");
    describe_counter!(REQUESTS_FAILED, "Requests whose payload returned an error or panicked");
    describe_counter!(REQUESTS_REJECTED, "Requests rejected by admission or the circuit breaker");
    describe_counter!(REQUESTS_TIMED_OUT, "Requests that exceeded their deadline");
    describe_counter!(REQUESTS_CANCELLED, "Requests cancelled through their handle");
    describe_counter!(REQUESTS_ABORTED, "Requests aborted by shutdown");
    describe_gauge!(QUEUE_DEPTH, "Requests waiting in the admission queue");
    describe_histogram!(REQUEST_LATENCY, Unit::Milliseconds, "Payload execution time");
    describe_histogram!(QUEUE_WAIT, Unit::Milliseconds, "Time spent queued before dispatch");
}

pub fn record_request_submitted(queue_depth: usize) {
    counter!(REQUESTS_SUBMITTED).increment(1);
    record_queue_depth(queue_depth);
}

pub fn record_request_rejected(reason: &'static str) {
    counter!(REQUESTS_REJECTED, "reason" => reason).increment(1);
}

pub fn record_request_success(latency_ms: u64, queue_wait_ms: u64) {
    counter!(REQUESTS_PROCESSED).increment(1);
    histogram!(REQUEST_LATENCY).record(latency_ms as f64);
    histogram!(QUEUE_WAIT).record(queue_wait_ms as f64);
}

pub fn record_request_failure(panicked: bool) {
    let kind = if panicked { "panic" } else { "error" };
    counter!(REQUESTS_FAILED, "kind" => kind).increment(1);
}

pub fn record_request_timeout(expired_in_queue: bool) {
    let stage = if expired_in_queue { "queued" } else { "running" };
    counter!(REQUESTS_TIMED_OUT, "stage" => stage).increment(1);
}

pub fn record_request_cancelled() {
    counter!(REQUESTS_CANCELLED).increment(1);
}

pub fn record_request_aborted() {
    counter!(REQUESTS_ABORTED).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}
