//! Per-client token-bucket rate limiting.
//!
//! Each connection gets an independent bucket keyed by client id.  Tokens
//! refill continuously at the configured rate up to the burst capacity.  An
//! over-budget request fails with `RateLimitExceeded`; the connection is not
//! closed.  The limiter is consulted before authorization so unauthenticated
//! floods are rejected cheaply.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter keyed by client id.
pub struct RateLimiter {
    buckets: DashMap<u64, TokenBucket>,
    capacity: f64,
    window: Duration,
}

impl RateLimiter {
    /// Allow `requests_per_second` sustained, with up to `burst` in a spike.
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(burst.max(1)),
            // One full refill of `capacity` tokens per this window.
            window: Duration::from_secs_f64(
                f64::from(burst.max(1)) / f64::from(requests_per_second.max(1)),
            ),
        }
    }

    /// Try to consume one token for the client.  `false` means rate-limited.
    pub fn try_acquire(&self, client_id: u64) -> bool {
        let now = Instant::now();
        let mut entry = self.buckets.entry(client_id).or_insert_with(|| TokenBucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let bucket = entry.value_mut();

        let elapsed = now.duration_since(bucket.last_refill);
        let refill = (elapsed.as_secs_f64() / self.window.as_secs_f64()) * self.capacity;
        bucket.tokens = (bucket.tokens + refill).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop the bucket for a departed client.
    pub fn forget(&self, client_id: u64) {
        self.buckets.remove(&client_id);
    }
}
