//! Per-identity token-bucket admission control.
//!
//! Capacity is `N` requests; refill runs at `N/60` tokens per second so a
//! full bucket drains over one minute under sustained load. The retry hint
//! handed back on rejection is always 60 seconds, not derived from the
//! actual deficit — the one caller that reads it (an HTTP `Retry-After`
//! header) doesn't need more precision than that.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for `{key}`, retry after {retry_after:?}")]
    Exceeded { key: String, retry_after: Duration },
}

const RETRY_HINT: Duration = Duration::from_secs(60);
const GC_IDLE_THRESHOLD: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: f64,
}

impl RateLimitConfig {
    /// `requests_per_minute` becomes both bucket capacity and the
    /// refill target: a bucket recovers to full over one minute.
    pub fn requests_per_minute(requests_per_minute: u32) -> Self {
        Self {
            capacity: requests_per_minute as f64,
        }
    }

    fn tokens_per_second(&self) -> f64 {
        self.capacity / 60.0
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    /// Last time this bucket was consumed from. A bucket that has sat
    /// full since this timestamp is idle and eligible for GC.
    last_used: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        let now = Instant::now();
        Self {
            tokens: capacity,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, tokens_per_second: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * tokens_per_second).min(capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, tokens_per_second: f64, capacity: f64) -> Result<(), Duration> {
        self.refill(tokens_per_second, capacity);
        self.last_used = Instant::now();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(RETRY_HINT)
        }
    }

    fn is_idle_at_capacity(&self, capacity: f64) -> bool {
        self.tokens >= capacity && self.last_used.elapsed() >= GC_IDLE_THRESHOLD
    }
}

/// Admission control keyed by client address (request path) or user id
/// (streaming path) — the caller picks which identity to pass as `key`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.capacity));

        match bucket.try_consume(self.config.tokens_per_second(), self.config.capacity) {
            Ok(()) => Ok(()),
            Err(retry_after) => {
                warn!(key, ?retry_after, "rate limit exceeded");
                Err(RateLimitError::Exceeded {
                    key: key.to_string(),
                    retry_after,
                })
            }
        }
    }

    /// Current headroom for `key`, without consuming a token. Used by the
    /// liveness/readiness probes, which bypass admission but still report
    /// it.
    pub fn remaining(&self, key: &str) -> f64 {
        match self.buckets.get(key) {
            Some(bucket) => {
                let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                (bucket.tokens + elapsed * self.config.tokens_per_second()).min(self.config.capacity)
            }
            None => self.config.capacity,
        }
    }

    /// Drop buckets that have sat full (unused) for at least 10 minutes.
    /// Intended to run on a periodic timer alongside the connection
    /// registry's idle sweep.
    pub fn gc_idle_buckets(&self) {
        let capacity = self.config.capacity;
        self.buckets
            .retain(|_, bucket| !bucket.is_idle_at_capacity(capacity));
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
