//! Per-client token-bucket admission control.

use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = elapsed.mul_add(refill_rate, self.tokens).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(config.burst),
            refill_rate: config.requests_per_second,
        }
    }

    /// Take one token from `client`'s bucket, creating a full bucket on
    /// first sight. Different clients never contend on the same bucket.
    pub fn allow(&self, client: &str) -> bool {
        match self.buckets.get_mut(client) {
            Some(mut bucket) => bucket.try_acquire(self.capacity, self.refill_rate),
            None => self
                .buckets
                .entry(client.to_string())
                .or_insert_with(|| TokenBucket::full(self.capacity))
                .try_acquire(self.capacity, self.refill_rate),
        }
    }

    pub fn admit(&self, client: &str) -> Result<(), DispatchError> {
        if self.allow(client) {
            Ok(())
        } else {
            Err(DispatchError::AdmissionRejected {
                client: client.to_string(),
            })
        }
    }

    /// Number of clients with a bucket.
    #[must_use]
    pub fn clients(&self) -> usize {
        self.buckets.len()
    }
}
