//! Span utilities for dispatched requests.

use tracing::{info_span, Span};

use crate::scheduler::{Priority, RequestId};

/// Factory for request dispatch spans.
pub struct RequestSpan;

impl RequestSpan {
    /// `status`, `error.message`, `queue_wait_ms` and `latency_ms` are
    /// filled in by the worker once the request finishes.
    pub fn new(request_id: RequestId, name: &str, priority: Priority, worker_id: usize) -> Span {
        info_span!(
            "gateway_request",
            request_id,
            name = %name,
            priority = %priority,
            worker_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            queue_wait_ms = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
