//! Gateway Core
//!
//! Request admission and scheduling for the assistant gateway. Work is
//! admitted into a bounded priority queue, dispatched by a small worker pool
//! at a rate set by a token bucket, and executed behind a circuit breaker.
//! Long-running work can be tracked by id through the task registry.
//!
//! # Guarantees
//!
//! - Admission never waits: a full queue or an open breaker is an
//!   immediate, distinguishable rejection.
//! - Dispatch order is strict priority with FIFO tie-break among queued
//!   requests; running work is never preempted.
//! - Every dequeued request runs at most once.
//! - Every accepted request's handle resolves, including across a forced
//!   shutdown.

pub mod admission;
pub mod config;
pub mod error;
pub mod health;
pub mod scheduler;
pub mod shutdown;
pub mod tasks;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use config::GatewayConfig;
pub use error::{BoxError, GatewayError};
pub use scheduler::{Priority, RequestHandle, RequestManager, SubmitOptions};
pub use tasks::{TaskId, TaskRecord, TaskRegistry, TaskStatus};

/// A request manager paired with the task registry that tracks its work.
pub struct Gateway<T = serde_json::Value> {
    pub manager: Arc<RequestManager>,
    pub tasks: TaskRegistry<T>,
}

impl<T> Gateway<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a gateway with a stopped manager and an unbounded registry.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            manager: Arc::new(RequestManager::new(config)),
            tasks: TaskRegistry::new(),
        }
    }

    /// Create a gateway whose finished task records expire after `ttl`.
    pub fn with_task_ttl(config: GatewayConfig, ttl: Duration) -> Self {
        Self {
            manager: Arc::new(RequestManager::new(config)),
            tasks: TaskRegistry::with_ttl(ttl),
        }
    }

    /// Submit a payload and track it as a task.
    ///
    /// Admission rejections are returned directly; no task is created for
    /// rejected work.
    pub fn submit_task<F, Fut, E>(
        &self,
        payload: F,
        options: impl Into<SubmitOptions>,
    ) -> Result<TaskId, GatewayError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let handle = self.manager.submit_with(payload, options.into())?;
        Ok(self.tasks.create_task(handle))
    }
}
