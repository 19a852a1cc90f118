//! Token bucket rate limiting for dispatch.
//!
//! Tokens refill lazily on every access:
//! `tokens = min(capacity, tokens + elapsed_secs * rate)`.
//! A waiting caller sleeps exactly until the next token is due rather than
//! polling, and gives up only when the shutdown token fires first.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for the token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    /// Refill rate in permits per second.
    pub rate: f64,
    /// Maximum burst size.
    pub capacity: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { rate: 10.0, capacity: 20.0 }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket. Starts full.
pub struct TokenBucket {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Build a full bucket.
    ///
    /// Capacity is floored at one token so a dispatch can always proceed
    /// eventually. A rate that is not a positive finite number never
    /// refills.
    pub fn new(config: TokenBucketConfig) -> Self {
        let capacity = config.capacity.max(1.0);
        let rate = if config.rate.is_finite() && config.rate > 0.0 { config.rate } else { 0.0 };
        if capacity != config.capacity || rate != config.rate {
            tracing::warn!(
                requested_rate = config.rate,
                requested_capacity = config.capacity,
                rate,
                capacity,
                "token bucket config adjusted"
            );
        }
        Self {
            config: TokenBucketConfig { rate, capacity },
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.rate).min(self.config.capacity);
        state.last_refill = now;
    }

    /// Take one token if available.
    ///
    /// On failure returns how long until the next token is due, or `None`
    /// when the bucket never refills (zero rate) or the wait does not fit
    /// in a `Duration`.
    pub fn try_acquire(&self) -> Result<(), Option<Duration>> {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        if self.config.rate <= 0.0 {
            return Err(None);
        }
        let deficit = 1.0 - state.tokens;
        match Duration::try_from_secs_f64(deficit / self.config.rate) {
            Ok(wait) => Err(Some(wait.max(Duration::from_millis(1)))),
            Err(_) => Err(None),
        }
    }

    /// Wait for a token.
    ///
    /// Returns `true` once a token was consumed, `false` if `shutdown` was
    /// cancelled before one became available.
    pub async fn acquire(&self, shutdown: &CancellationToken) -> bool {
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => wait,
            };

            match wait {
                Some(wait) => {
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => return false,
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                None => {
                    shutdown.cancelled().await;
                    return false;
                }
            }
        }
    }

    /// Current token count after refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.config.capacity
    }

    pub fn rate(&self) -> f64 {
        self.config.rate
    }
}
