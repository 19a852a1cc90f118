//! Queued request type and the caller-side result handle.
//!
//! A payload is type-erased behind [`Job`] so one queue can carry work of
//! any result type. The worker learns the outcome first (for breaker and
//! metrics accounting) and only then delivers it to the handle.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::priority::Priority;
use crate::error::{BoxError, GatewayError};

/// Monotonic per-manager request identifier.
pub type RequestId = u64;

type ResultTx<T> = oneshot::Sender<Result<T, GatewayError>>;
type ResultRx<T> = oneshot::Receiver<Result<T, GatewayError>>;
type PayloadFn<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, BoxError>> + Send>;

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Succeeded,
    Failed { message: String, panicked: bool },
    Cancelled,
    TimedOut,
    Aborted,
}

/// Outcome of a job plus its not-yet-delivered result.
pub(crate) struct Completion {
    pub outcome: JobOutcome,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Completion {
    /// Resolve the caller's handle.
    pub fn deliver(self) {
        (self.deliver)()
    }
}

/// Type-erased unit of work.
pub(crate) trait Job: Send + 'static {
    fn run(
        self: Box<Self>,
        cancel: CancellationToken,
        force: CancellationToken,
        deadline: Option<(Instant, Duration)>,
    ) -> BoxFuture<'static, Completion>;

    fn reject(self: Box<Self>, error: GatewayError);
}

struct TypedJob<T> {
    payload: PayloadFn<T>,
    tx: ResultTx<T>,
}

impl<T: Send + 'static> Job for TypedJob<T> {
    fn run(
        self: Box<Self>,
        cancel: CancellationToken,
        force: CancellationToken,
        deadline: Option<(Instant, Duration)>,
    ) -> BoxFuture<'static, Completion> {
        let TypedJob { payload, tx } = *self;
        Box::pin(async move {
            let exec = AssertUnwindSafe(async move { payload().await }).catch_unwind();
            let expiry = async move {
                match deadline {
                    Some((at, _)) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let (result, outcome) = tokio::select! {
                biased;
                () = cancel.cancelled() => (Err(GatewayError::Cancelled), JobOutcome::Cancelled),
                () = force.cancelled() => (Err(GatewayError::ShutdownAborted), JobOutcome::Aborted),
                () = expiry => {
                    let timeout = deadline.map(|(_, t)| t).unwrap_or_default();
                    (
                        Err(GatewayError::Timeout { timeout, expired_in_queue: false }),
                        JobOutcome::TimedOut,
                    )
                }
                res = exec => match res {
                    Ok(Ok(value)) => (Ok(value), JobOutcome::Succeeded),
                    Ok(Err(err)) => {
                        let message = err.to_string();
                        (
                            Err(GatewayError::Execution(message.clone())),
                            JobOutcome::Failed { message, panicked: false },
                        )
                    }
                    Err(panic) => {
                        let message = format!("payload panicked: {}", panic_message(panic.as_ref()));
                        (
                            Err(GatewayError::Execution(message.clone())),
                            JobOutcome::Failed { message, panicked: true },
                        )
                    }
                },
            };

            Completion {
                outcome,
                deliver: Box::new(move || {
                    let _ = tx.send(result);
                }),
            }
        })
    }

    fn reject(self: Box<Self>, error: GatewayError) {
        let _ = self.tx.send(Err(error));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A request waiting in the admission queue.
pub struct QueuedRequest {
    pub id: RequestId,
    pub name: String,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub timeout: Option<Duration>,
    pub deadline: Option<Instant>,
    cancel: CancellationToken,
    job: Box<dyn Job>,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl QueuedRequest {
    /// Build a request and the handle its submitter will await.
    pub fn new<F, Fut, T, E>(
        id: RequestId,
        name: impl Into<String>,
        priority: Priority,
        timeout: Option<Duration>,
        payload: F,
    ) -> (Self, RequestHandle<T>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let payload: PayloadFn<T> =
            Box::new(move || async move { payload().await.map_err(Into::into) }.boxed());

        let enqueued_at = Instant::now();
        let request = Self {
            id,
            name: name.into(),
            priority,
            enqueued_at,
            timeout,
            deadline: timeout.map(|t| enqueued_at + t),
            cancel: cancel.clone(),
            job: Box::new(TypedJob { payload, tx }),
        };
        let handle = RequestHandle { id, priority, rx, cancel };
        (request, handle)
    }

    /// Check if request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Check if request has exceeded its deadline.
    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Resolve the handle with `error` without running the payload.
    pub fn reject(self, error: GatewayError) {
        self.job.reject(error);
    }

    pub(crate) fn run(self, force: CancellationToken) -> BoxFuture<'static, Completion> {
        let deadline = self.deadline.zip(self.timeout);
        self.job.run(self.cancel, force, deadline)
    }
}

/// Caller-side handle to a submitted request.
///
/// Awaiting it yields the payload's value or the error that ended the
/// request. If the request is dropped unresolved (its worker was torn down)
/// the handle yields [`GatewayError::ShutdownAborted`].
pub struct RequestHandle<T> {
    id: RequestId,
    priority: Priority,
    rx: ResultRx<T>,
    cancel: CancellationToken,
}

impl<T> std::fmt::Debug for RequestHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish()
    }
}

impl<T> RequestHandle<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Request cooperative cancellation. A queued request will not run; a
    /// running one is dropped at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this request when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Non-blocking check for a result.
    pub fn try_result(&mut self) -> Option<Result<T, GatewayError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(GatewayError::ShutdownAborted)),
        }
    }
}

impl<T> Unpin for RequestHandle<T> {}

impl<T> Future for RequestHandle<T> {
    type Output = Result<T, GatewayError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(GatewayError::ShutdownAborted)))
    }
}
