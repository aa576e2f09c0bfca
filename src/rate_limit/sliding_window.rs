// src/rate_limit/sliding_window.rs
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{LimiterStatus, RateLimiter};

/// Allows a request iff fewer than `max_requests` timestamps fall in the trailing window.
/// Expired timestamps are purged lazily on each call.
#[derive(Debug)]
pub struct SlidingWindow {
    max_requests: u32,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window: window.max(Duration::from_millis(1)),
            stamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    fn purge(&self, stamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = stamps.front() {
            if now.saturating_duration_since(front) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter for SlidingWindow {
    fn acquire(&self, tokens: u32) -> bool {
        let now = Instant::now();
        let mut stamps = self.stamps.lock().expect("sliding window mutex poisoned");
        self.purge(&mut stamps, now);
        if stamps.len() + tokens as usize <= self.max_requests as usize {
            for _ in 0..tokens {
                stamps.push_back(now);
            }
            true
        } else {
            false
        }
    }

    fn status(&self) -> LimiterStatus {
        let mut stamps = self.stamps.lock().expect("sliding window mutex poisoned");
        self.purge(&mut stamps, Instant::now());
        LimiterStatus {
            strategy: "sliding_window",
            available: f64::from(self.max_requests) - stamps.len() as f64,
            capacity: f64::from(self.max_requests),
            rate_per_minute: f64::from(self.max_requests) * 60.0 / self.window.as_secs_f64(),
        }
    }

    fn retry_hint(&self, tokens: u32) -> Duration {
        let now = Instant::now();
        let mut stamps = self.stamps.lock().expect("sliding window mutex poisoned");
        self.purge(&mut stamps, now);
        let excess = (stamps.len() + tokens as usize).saturating_sub(self.max_requests as usize);
        match excess.checked_sub(1).and_then(|i| stamps.get(i)) {
            Some(&stamp) => (stamp + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}
