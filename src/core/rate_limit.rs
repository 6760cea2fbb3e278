//! Token-bucket rate limiter for platform API calls.
//!
//! Staying under each platform's request ceiling is a correctness
//! requirement: exceeding it triggers provider-side throttling that shows
//! up downstream as a wave of false transient failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained request budget per minute.
    pub requests_per_minute: u32,
    /// Short bursts may exceed the sustained rate up to this many requests.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 5,
        }
    }
}

/// Token bucket shared by all requests to one platform.
///
/// Clones share the same bucket, so a provider can be cloned into tasks
/// while still counting against a single budget.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let state = BucketState {
            tokens: config.burst_size as f64,
            last_refill: Instant::now(),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Acquire one request token, sleeping until one is available.
    ///
    /// Returns the total wait duration if the caller had to wait. A token
    /// is only ever taken while a full one is in the bucket; waiters that
    /// slept re-check on wakeup, since concurrent callers may have drained
    /// the refill in the meantime.
    pub async fn acquire(&self) -> Option<Duration> {
        let mut total_wait = Duration::ZERO;

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return if total_wait.is_zero() {
                        None
                    } else {
                        Some(total_wait)
                    };
                }

                let tokens_needed = 1.0 - state.tokens;
                let tokens_per_second = self.config.requests_per_minute as f64 / 60.0;
                Duration::from_secs_f64(tokens_needed / tokens_per_second)
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            total_wait += wait;
            tokio::time::sleep(wait).await;
        }
    }

    /// Acquire a token without waiting. Returns false when rate limited.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let tokens_per_second = self.config.requests_per_minute as f64 / 60.0;
        state.tokens = (state.tokens + elapsed * tokens_per_second).min(self.config.burst_size as f64);
        state.last_refill = now;
    }
}
