//! Process-wide token bucket shared by every request.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitSettings;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    burst: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        let burst = f64::from(settings.burst.max(1));
        Self {
            burst,
            refill_per_sec: f64::from(settings.refill_per_sec),
            bucket: Mutex::new(Bucket { tokens: burst, last: Instant::now() }),
        }
    }

    pub fn allow(&self) -> bool { self.allow_at(Instant::now()) }

    /// Refill for the time elapsed since the last call, then take one token.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut b = self.bucket.lock();
        let elapsed = now.saturating_duration_since(b.last);
        b.tokens = (b.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.burst);
        if now > b.last { b.last = now; }
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token, for Retry-After.
    pub fn retry_after(&self) -> Duration {
        let b = self.bucket.lock();
        if b.tokens >= 1.0 || self.refill_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - b.tokens) / self.refill_per_sec)
    }
}
