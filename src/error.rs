//! Gateway error types.
//!
//! Admission rejections are returned synchronously from `submit`; every
//! other outcome reaches the caller through the request handle.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a payload.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the gateway scheduling core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Request queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Service shutting down; request aborted")]
    ShutdownAborted,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {}ms{}", .timeout.as_millis(), queue_suffix(.expired_in_queue))]
    Timeout {
        timeout: Duration,
        expired_in_queue: bool,
    },
}

fn queue_suffix(expired_in_queue: &bool) -> &'static str {
    if *expired_in_queue {
        " (expired in queue)"
    } else {
        ""
    }
}

impl GatewayError {
    /// Wrap a payload error, keeping only its rendered message.
    pub fn execution<E: Into<BoxError>>(err: E) -> Self {
        Self::Execution(err.into().to_string())
    }

    /// True for errors raised at admission time (nothing was queued).
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::CircuitOpen)
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::CircuitOpen | Self::Timeout { .. }
        )
    }
}
