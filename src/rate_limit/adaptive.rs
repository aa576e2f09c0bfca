// src/rate_limit/adaptive.rs
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{LimiterStatus, RateLimiter, TokenBucket};

pub const DEFAULT_ADJUST_INTERVAL: Duration = Duration::from_secs(60);

/// Token bucket whose rate follows the success ratio reported by its caller.
///
/// Every adjustment interval the ratio `successes / (successes + failures)` rescales
/// the rate within `[min_rate, max_rate]`:
/// `>0.95` → ×1.2, `>0.85` → ×1.1, `<0.70` → ×0.7, `<0.80` → ×0.9, otherwise unchanged.
/// Counters reset after each adjustment.
#[derive(Debug)]
pub struct AdaptiveLimiter {
    bucket: TokenBucket,
    min_rate: f64,
    max_rate: f64,
    adjust_interval: Duration,
    counters: Mutex<Counters>,
}

#[derive(Debug)]
struct Counters {
    successes: u64,
    failures: u64,
    last_adjust: Instant,
}

impl AdaptiveLimiter {
    pub fn new(rate_per_minute: u32, burst: Option<u32>, min_rate: f64, max_rate: f64) -> Self {
        let min_rate = min_rate.max(f64::MIN_POSITIVE);
        Self {
            bucket: TokenBucket::new(rate_per_minute, burst),
            min_rate,
            max_rate: max_rate.max(min_rate),
            adjust_interval: DEFAULT_ADJUST_INTERVAL,
            counters: Mutex::new(Counters {
                successes: 0,
                failures: 0,
                last_adjust: Instant::now(),
            }),
        }
    }

    pub fn with_adjust_interval(mut self, interval: Duration) -> Self {
        self.adjust_interval = interval;
        self
    }

    pub fn current_rate(&self) -> f64 {
        self.bucket.rate_per_minute()
    }

    /// Recompute the rate from the counters gathered so far and reset them.
    /// Returns the rate in effect afterwards.
    pub fn adjust(&self) -> f64 {
        let mut c = self.counters.lock().expect("adaptive limiter mutex poisoned");
        self.adjust_locked(&mut c)
    }

    fn adjust_locked(&self, c: &mut Counters) -> f64 {
        let current = self.bucket.rate_per_minute();
        let total = c.successes + c.failures;
        c.last_adjust = Instant::now();
        if total == 0 {
            return current;
        }
        let ratio = c.successes as f64 / total as f64;
        let factor = adjustment_factor(ratio);
        let next = (current * factor).clamp(self.min_rate, self.max_rate);
        if (next - current).abs() > f64::EPSILON {
            self.bucket.set_rate(next);
            debug!(
                target: "ingest",
                ratio, from = current, to = next,
                "adaptive rate limit adjusted"
            );
        }
        c.successes = 0;
        c.failures = 0;
        next
    }

    fn maybe_adjust(&self) {
        let mut c = self.counters.lock().expect("adaptive limiter mutex poisoned");
        if c.last_adjust.elapsed() >= self.adjust_interval {
            self.adjust_locked(&mut c);
        }
    }
}

fn adjustment_factor(success_ratio: f64) -> f64 {
    if success_ratio > 0.95 {
        1.2
    } else if success_ratio > 0.85 {
        1.1
    } else if success_ratio < 0.70 {
        0.7
    } else if success_ratio < 0.80 {
        0.9
    } else {
        1.0
    }
}

impl RateLimiter for AdaptiveLimiter {
    fn acquire(&self, tokens: u32) -> bool {
        self.maybe_adjust();
        self.bucket.acquire(tokens)
    }

    fn status(&self) -> LimiterStatus {
        self.bucket.status_as("adaptive")
    }

    fn retry_hint(&self, tokens: u32) -> Duration {
        self.bucket.retry_hint(tokens)
    }

    fn record_success(&self) {
        self.counters
            .lock()
            .expect("adaptive limiter mutex poisoned")
            .successes += 1;
    }

    fn record_failure(&self) {
        self.counters
            .lock()
            .expect("adaptive limiter mutex poisoned")
            .failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(l: &AdaptiveLimiter, ok: u32, failed: u32) {
        for _ in 0..ok {
            l.record_success();
        }
        for _ in 0..failed {
            l.record_failure();
        }
    }

    #[test]
    fn factor_bands() {
        assert_eq!(adjustment_factor(1.0), 1.2);
        assert_eq!(adjustment_factor(0.9), 1.1);
        assert_eq!(adjustment_factor(0.82), 1.0);
        assert_eq!(adjustment_factor(0.75), 0.9);
        assert_eq!(adjustment_factor(0.5), 0.7);
    }

    #[test]
    fn high_success_speeds_up_within_bounds() {
        let l = AdaptiveLimiter::new(100, None, 50.0, 130.0);
        record(&l, 100, 0);
        assert!((l.adjust() - 120.0).abs() < 1e-9);
        record(&l, 100, 0);
        // 144 clamped to max
        assert!((l.adjust() - 130.0).abs() < 1e-9);
    }

    #[test]
    fn failures_slow_down_and_counters_reset() {
        let l = AdaptiveLimiter::new(100, None, 50.0, 400.0);
        record(&l, 5, 5);
        assert!((l.adjust() - 70.0).abs() < 1e-9);
        // no new observations: unchanged
        assert!((l.adjust() - 70.0).abs() < 1e-9);
        record(&l, 1, 9);
        assert!((l.adjust() - 50.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_triggers_periodic_adjustment() {
        let l = AdaptiveLimiter::new(100, None, 10.0, 1000.0)
            .with_adjust_interval(Duration::from_secs(60));
        record(&l, 20, 0);
        assert!(l.acquire(1));
        assert!((l.current_rate() - 100.0).abs() < 1e-9);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(l.acquire(1));
        assert!((l.current_rate() - 120.0).abs() < 1e-9);
    }
}
