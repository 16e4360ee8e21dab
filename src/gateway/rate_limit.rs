//! Submission rate limiting
//!
//! A token bucket per (route, consumer) pair. Buckets are created lazily at
//! full capacity and refilled continuously at a fixed rate. The store trait
//! keeps check-and-decrement atomic in a single call, so a shared backend
//! (one server-side script round trip) can replace the in-memory map when
//! multiple instances run; the limiter logic itself does not change.

use crate::config::RateLimitConfig;
use crate::core::clock::Clock;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Whole tokens left in the bucket after this check
    pub remaining: u32,
    /// How long until at least one token is available (set on rejection)
    pub retry_after: Option<Duration>,
}

/// Atomic storage for token buckets
///
/// `take` must perform refill, check, and decrement as one atomic
/// operation; callers never see intermediate state.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Takes one token from the bucket, creating it at full capacity first
    /// if it does not exist
    async fn take(
        &self,
        key: &str,
        capacity: u32,
        refill_per_sec: f64,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision>;

    /// Returns one token, capped at capacity
    ///
    /// Used when a request turned out not to consume the quota, e.g. an
    /// idempotent replay recognized after the rate-limit gate.
    async fn put_back(&self, key: &str, capacity: u32, now: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

/// In-memory bucket store for single-process deployments
#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryBucketStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn refill(bucket: &mut Bucket, capacity: u32, refill_per_sec: f64, now: DateTime<Utc>) {
    let elapsed = (now - bucket.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
    bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(f64::from(capacity));
    bucket.last_refill = now;
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn take(
        &self,
        key: &str,
        capacity: u32,
        refill_per_sec: f64,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: f64::from(capacity),
            last_refill: now,
        });
        refill(bucket, capacity, refill_per_sec, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u32,
                retry_after: None,
            })
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_ms = (deficit / refill_per_sec * 1000.0).ceil() as u64;
            Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(Duration::from_millis(wait_ms.max(1))),
            })
        }
    }

    async fn put_back(&self, key: &str, capacity: u32, _now: DateTime<Utc>) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get_mut(key) {
            bucket.tokens = (bucket.tokens + 1.0).min(f64::from(capacity));
        }
        Ok(())
    }
}

/// Per-route, per-consumer token bucket limiter
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter over the given bucket store
    pub fn new(store: Arc<dyn BucketStore>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    fn bucket_key(route_key: &str, consumer_key: &str) -> String {
        format!("{route_key}:{consumer_key}")
    }

    /// Checks and consumes one token for the (route, consumer) pair
    ///
    /// On depletion the decision carries the wait until at least one token
    /// is available.
    ///
    /// # Errors
    ///
    /// Propagates bucket store failures.
    pub async fn allow(&self, route_key: &str, consumer_key: &str) -> Result<RateLimitDecision> {
        let decision = self
            .store
            .take(
                &Self::bucket_key(route_key, consumer_key),
                self.config.capacity,
                self.config.refill_per_sec,
                self.clock.now(),
            )
            .await?;

        if !decision.allowed {
            counter!("caravan_rate_limited_total", "route" => route_key.to_string())
                .increment(1);
            tracing::debug!(
                route = route_key,
                consumer = consumer_key,
                retry_after_ms = decision
                    .retry_after
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
                "Request rate limited"
            );
        }
        Ok(decision)
    }

    /// Returns the token consumed by a request that produced no new work
    ///
    /// Idempotent replays must not spend quota, but the rate-limit gate
    /// runs before the idempotency lookup, so the token is refunded once
    /// the replay is recognized.
    ///
    /// # Errors
    ///
    /// Propagates bucket store failures.
    pub async fn refund(&self, route_key: &str, consumer_key: &str) -> Result<()> {
        self.store
            .put_back(
                &Self::bucket_key(route_key, consumer_key),
                self.config.capacity,
                self.clock.now(),
            )
            .await
    }
}
