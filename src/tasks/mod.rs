//! Task tracking for long-running gateway work.

mod registry;

pub use registry::{TaskId, TaskRecord, TaskRegistry, TaskStatus};
