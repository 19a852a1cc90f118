//! Task handle registry.
//!
//! Wraps a request handle with a stable external id so a caller can poll
//! status or cancel later without holding on to the handle. Each record
//! moves from `Pending` to a terminal state exactly once.
//!
//! Uses DashMap for concurrent access without a global lock.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize, Serializer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::scheduler::RequestHandle;

/// Opaque external task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// Point-in-time copy of a task's state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord<T> {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub result: Option<T>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<GatewayError>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

fn serialize_error<S: Serializer>(error: &Option<GatewayError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

struct TaskEntry<T> {
    record: TaskRecord<T>,
    cancel: CancellationToken,
    finished: Option<Instant>,
}

/// Registry of tasks keyed by [`TaskId`].
///
/// Records are kept until removed with [`TaskRegistry::remove_task`] or,
/// for a registry built with [`TaskRegistry::with_ttl`], until a
/// [`TaskRegistry::purge_expired`] call finds them older than the TTL.
pub struct TaskRegistry<T> {
    tasks: Arc<DashMap<TaskId, TaskEntry<T>>>,
    ttl: Option<Duration>,
}

impl<T> Clone for TaskRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
            ttl: self.ttl,
        }
    }
}

impl<T> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self { tasks: Arc::new(DashMap::new()), ttl: None }
    }
}

impl<T> TaskRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose terminal records become purgeable after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl), ..Self::default() }
    }

    /// Track `handle` under a fresh id and start observing its completion.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create_task(&self, handle: RequestHandle<T>) -> TaskId {
        let task_id = TaskId::new();
        let cancel = handle.cancellation_token();
        self.tasks.insert(
            task_id,
            TaskEntry {
                record: TaskRecord {
                    task_id,
                    status: TaskStatus::Pending,
                    result: None,
                    error: None,
                    created_at: Utc::now(),
                    finished_at: None,
                },
                cancel: cancel.clone(),
                finished: None,
            },
        );
        tracing::debug!(%task_id, request_id = handle.id(), "task created");

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                result = handle => result,
                () = cancel.cancelled() => Err(GatewayError::Cancelled),
            };
            finish(&tasks, task_id, result);
        });
        task_id
    }

    pub fn get_task_status(&self, task_id: &TaskId) -> Option<TaskRecord<T>> {
        self.tasks.get(task_id).map(|entry| entry.record.clone())
    }

    /// Request cancellation of a pending task.
    ///
    /// Returns whether the request was accepted, not whether the payload
    /// has stopped. Unknown and already finished tasks return `false`.
    pub fn cancel_task(&self, task_id: &TaskId) -> bool {
        let Some(entry) = self.tasks.get(task_id) else {
            return false;
        };
        if entry.record.status.is_terminal() {
            return false;
        }
        entry.cancel.cancel();
        tracing::info!(%task_id, "task cancellation requested");
        true
    }

    /// Drop a record. A still-pending task keeps running; its outcome is
    /// discarded.
    pub fn remove_task(&self, task_id: &TaskId) -> Option<TaskRecord<T>> {
        self.tasks.remove(task_id).map(|(_, entry)| entry.record)
    }

    /// Remove terminal records older than the TTL. Returns how many were
    /// removed; always zero without a TTL.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.tasks.len();
        self.tasks
            .retain(|_, entry| entry.finished.map_or(true, |at| at.elapsed() < ttl));
        let purged = before.saturating_sub(self.tasks.len());
        if purged > 0 {
            tracing::debug!(purged, "purged expired task records");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn finish<T>(tasks: &DashMap<TaskId, TaskEntry<T>>, task_id: TaskId, result: Result<T, GatewayError>) {
    let Some(mut entry) = tasks.get_mut(&task_id) else {
        return;
    };
    if entry.record.status.is_terminal() {
        return;
    }
    match result {
        Ok(value) => {
            entry.record.status = TaskStatus::Success;
            entry.record.result = Some(value);
        }
        Err(err) => {
            if err.is_warning() {
                tracing::warn!(%task_id, error = %err, "task failed");
            } else {
                tracing::debug!(%task_id, error = %err, "task failed");
            }
            entry.record.status = TaskStatus::Failed;
            entry.record.error = Some(err);
        }
    }
    entry.record.finished_at = Some(Utc::now());
    entry.finished = Some(Instant::now());
}
