//! Admission and dispatch gates: rate limiting and circuit breaking.

mod breaker;
mod token_bucket;

pub use breaker::{
    BreakerPermit, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState,
};
pub use token_bucket::{TokenBucket, TokenBucketConfig};
