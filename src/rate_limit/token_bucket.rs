// src/rate_limit/token_bucket.rs
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{LimiterStatus, RateLimiter};

/// Continuous-refill token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    rate_per_minute: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let per_sec = self.rate_per_minute / 60.0;
            self.tokens = (self.tokens + elapsed * per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }
}

impl TokenBucket {
    /// `burst` defaults to the per-minute rate. The bucket starts full.
    pub fn new(rate_per_minute: u32, burst: Option<u32>) -> Self {
        let rate = f64::from(rate_per_minute.max(1));
        let capacity = f64::from(burst.unwrap_or(rate_per_minute).max(1));
        Self {
            state: Mutex::new(BucketState {
                rate_per_minute: rate,
                capacity,
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate_per_minute(&self) -> f64 {
        self.state.lock().expect("token bucket mutex poisoned").rate_per_minute
    }

    /// Change the refill rate. Tokens accrued so far are kept.
    pub fn set_rate(&self, rate_per_minute: f64) {
        let mut st = self.state.lock().expect("token bucket mutex poisoned");
        st.refill(Instant::now());
        st.rate_per_minute = rate_per_minute.max(f64::MIN_POSITIVE);
    }

    pub(crate) fn status_as(&self, strategy: &'static str) -> LimiterStatus {
        let mut st = self.state.lock().expect("token bucket mutex poisoned");
        st.refill(Instant::now());
        LimiterStatus {
            strategy,
            available: st.tokens,
            capacity: st.capacity,
            rate_per_minute: st.rate_per_minute,
        }
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self, tokens: u32) -> bool {
        let need = f64::from(tokens);
        let mut st = self.state.lock().expect("token bucket mutex poisoned");
        st.refill(Instant::now());
        if st.tokens >= need {
            st.tokens -= need;
            true
        } else {
            false
        }
    }

    fn status(&self) -> LimiterStatus {
        self.status_as("token_bucket")
    }

    fn retry_hint(&self, tokens: u32) -> Duration {
        let mut st = self.state.lock().expect("token bucket mutex poisoned");
        st.refill(Instant::now());
        let missing = (f64::from(tokens) - st.tokens).max(0.0);
        let per_sec = st.rate_per_minute / 60.0;
        Duration::from_secs_f64((missing / per_sec).min(3600.0))
    }
}
