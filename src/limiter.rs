// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Token bucket rate limiter backed by a [`BucketStore`].
//!
//! Each throttled action is identified by a list of strings (for example
//! `["Sign in", "203.0.113.9"]`). The list is hashed into a resource key and
//! the bucket for that key is recomputed from its timestamps on every call:
//!
//! 1. Refill `floor(elapsed * rate / interval)` tokens, capped at capacity
//! 2. Admit the request if at least `cost` tokens are available
//! 3. Deduct the cost and persist the whole bucket map
//!
//! Because the bucket is rebuilt from timestamps, a lost write under
//! concurrent processes only costs precision, never correctness.

use crate::clock::Clock;
use crate::store::{Bucket, BucketStore, StoreError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned by [`RateLimiter::use_resource`].
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The bucket does not hold enough tokens
    #[error("Please try again in {retry_after_secs} seconds")]
    TooManyRequests { retry_after_secs: u64 },

    /// The quota can never admit anything (zero rate, interval or burst)
    #[error("Invalid throttle quota: {0}")]
    InvalidQuota(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

fn default_burst_factor() -> u32 {
    1
}

/// How fast a resource refills and how much it may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Tokens granted per interval
    pub rate: u32,
    /// Interval length in seconds
    pub interval_secs: u64,
    /// Capacity multiplier on `rate`
    #[serde(default = "default_burst_factor")]
    pub burst_factor: u32,
}

impl Quota {
    pub const fn new(rate: u32, interval_secs: u64) -> Self {
        Self {
            rate,
            interval_secs,
            burst_factor: 1,
        }
    }

    pub const fn with_burst(mut self, burst_factor: u32) -> Self {
        self.burst_factor = burst_factor;
        self
    }

    /// Maximum tokens a bucket may hold.
    pub fn capacity(&self) -> u64 {
        u64::from(self.burst_factor) * u64::from(self.rate)
    }

    /// Tokens added per second.
    pub fn fill_rate(&self) -> f64 {
        f64::from(self.rate) / self.interval_secs as f64
    }

    /// Whole tokens earned over `elapsed` seconds.
    fn tokens_for(&self, elapsed: u64) -> u64 {
        let tokens = u128::from(elapsed) * u128::from(self.rate) / u128::from(self.interval_secs);
        u64::try_from(tokens).unwrap_or(u64::MAX)
    }

    /// Seconds until `missing` tokens have been earned.
    fn seconds_for(&self, missing: u64) -> u64 {
        let secs = (u128::from(missing) * u128::from(self.interval_secs))
            .div_ceil(u128::from(self.rate));
        u64::try_from(secs).unwrap_or(u64::MAX)
    }

    /// Lifetime of an idle bucket: twice the time to fill it from empty.
    fn idle_lifetime(&self) -> i64 {
        let secs = 2 * u128::from(self.capacity()) * u128::from(self.interval_secs)
            / u128::from(self.rate);
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    fn validate(&self) -> Result<(), ThrottleError> {
        if self.rate == 0 {
            return Err(ThrottleError::InvalidQuota("rate must be positive".into()));
        }
        if self.interval_secs == 0 {
            return Err(ThrottleError::InvalidQuota("interval must be positive".into()));
        }
        if self.burst_factor == 0 {
            return Err(ThrottleError::InvalidQuota("burst factor must be positive".into()));
        }
        Ok(())
    }
}

/// Derive the bucket key for a resource: BLAKE3 of the space-joined parts,
/// truncated to 128 bits and base64 encoded.
pub fn resource_key(parts: &[&str]) -> String {
    let digest = blake3::hash(parts.join(" ").as_bytes());
    STANDARD.encode(&digest.as_bytes()[..16])
}

/// Thread-safe token bucket rate limiter.
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    /// Serializes load/compute/save cycles within this process
    cycle: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BucketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cycle: Mutex::new(()),
        }
    }

    /// Take `cost` tokens from the bucket for `parts`.
    ///
    /// Returns the tokens left after the deduction. With `simulate` set the
    /// decision is computed but nothing is deducted or persisted.
    pub fn use_resource(
        &self,
        parts: &[&str],
        quota: Quota,
        cost: u64,
        simulate: bool,
    ) -> Result<u64, ThrottleError> {
        quota.validate()?;

        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let key = resource_key(parts);
        let capacity = quota.capacity();

        let mut buckets = self.store.load()?;

        let (available, last_refreshed) = buckets
            .get(&key)
            .map(|b| (b.available, b.last_refreshed))
            .unwrap_or((capacity, now));

        // A clock that went backwards earns nothing. The timestamp comes from
        // storage and may hold anything.
        let elapsed = u64::try_from(now.saturating_sub(last_refreshed)).unwrap_or(0);
        let mut available = capacity.min(available.saturating_add(quota.tokens_for(elapsed)));

        let can_use = available >= cost;

        if can_use && !simulate {
            available = available.saturating_sub(cost);
            buckets.insert(
                key.clone(),
                Bucket {
                    available,
                    last_refreshed: now,
                    expires_at: now.saturating_add(quota.idle_lifetime()),
                },
            );
            self.store.save(&buckets)?;
        }

        if can_use {
            debug!(resource = %key, remaining = available, simulate, "Resource admitted");
            return Ok(available);
        }

        let retry_after_secs = quota.seconds_for(cost - available);
        warn!(resource = %key, cost, available, retry_after_secs, "Resource throttled");
        Err(ThrottleError::TooManyRequests { retry_after_secs })
    }

    /// Take a single token.
    pub fn consume(&self, parts: &[&str], quota: Quota) -> Result<u64, ThrottleError> {
        self.use_resource(parts, quota, 1, false)
    }

    /// Check whether a single token could be taken, without taking it.
    pub fn peek(&self, parts: &[&str], quota: Quota) -> Result<u64, ThrottleError> {
        self.use_resource(parts, quota, 1, true)
    }
}
