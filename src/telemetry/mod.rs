//! Telemetry for the gateway: structured logging, request spans, the owned
//! counter block, and `metrics` facade recorders.

mod counters;
mod logging;
mod recorders;
mod spans;

pub use counters::{GatewayMetrics, MetricsSnapshot, RequestCounters};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use recorders::{init_metrics, record_queue_depth};
pub use spans::RequestSpan;
