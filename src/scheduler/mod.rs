//! Request scheduling for the gateway.
//!
//! Manages request admission, priority ordering, the worker pool that
//! dispatches queued work, and the expired-request sweeper.

mod manager;
mod priority;
mod queue;
mod queued_request;
mod worker;

pub use manager::{RequestManager, SubmitOptions};
pub use priority::{PrioritizedItem, Priority, PriorityQueue};
pub use queue::{AdmissionQueue, AdmissionQueueConfig, QueueEntry};
pub use queued_request::{QueuedRequest, RequestHandle, RequestId};
pub use worker::{SchedulerCore, IDLE_POLL_INTERVAL};
