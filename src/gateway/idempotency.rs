//! Idempotency gateway
//!
//! Caches the full response of a completed submission under the
//! client-supplied idempotency key for a fixed retention window. A repeated
//! key with the same request fingerprint replays the cached response
//! verbatim; the same key with a different fingerprint is a conflict and
//! executes nothing. Admission of a key is a single atomic operation on
//! the store, so two concurrent requests can never both execute.

use crate::core::clock::Clock;
use crate::domain::{IdempotencyKey, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A cached HTTP response, replayed verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// HTTP status code
    pub status: u16,
    /// Content type of the body
    pub content_type: String,
    /// Response body bytes
    pub body: Vec<u8>,
}

/// Outcome of admitting a request key
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Key not seen before; proceed and call `complete` (or `abandon`)
    Fresh,
    /// Same key, same fingerprint, finished earlier: replay this response
    Replay(StoredResponse),
    /// Same key, different fingerprint: reject without executing
    Conflict,
    /// Same key, same fingerprint, but the first execution has not
    /// finished yet
    InFlight,
}

/// Storage for idempotency records
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically admits a key, registering it as in-flight when fresh
    async fn begin(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission>;

    /// Records the final response for a fresh key
    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: StoredResponse,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Releases a fresh key whose request failed before producing a
    /// cacheable response, so a client retry starts over
    async fn abandon(&self, key: &IdempotencyKey) -> Result<()>;
}

#[derive(Debug, Clone)]
enum EntryState {
    Pending,
    Complete(StoredResponse),
}

#[derive(Debug, Clone)]
struct Entry {
    fingerprint: String,
    stored_at: DateTime<Utc>,
    state: EntryState,
}

/// In-memory idempotency store for single-process deployments
///
/// Expired entries are purged lazily on access; a shared backend with
/// native TTLs replaces this when multiple instances run.
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryIdempotencyStore {
    /// Creates a store with the given retention window
    pub fn new(ttl_hours: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::hours(ttl_hours as i64),
        }
    }

    fn expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        entry.stored_at + self.ttl <= now
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn begin(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut entries = self.entries.lock().await;

        let is_expired = entries
            .get(key.as_str())
            .is_some_and(|entry| self.expired(entry, now));
        if is_expired {
            entries.remove(key.as_str());
        }

        match entries.get(key.as_str()) {
            None => {
                entries.insert(
                    key.as_str().to_string(),
                    Entry {
                        fingerprint: fingerprint.to_string(),
                        stored_at: now,
                        state: EntryState::Pending,
                    },
                );
                Ok(Admission::Fresh)
            }
            Some(entry) if entry.fingerprint != fingerprint => Ok(Admission::Conflict),
            Some(entry) => match &entry.state {
                EntryState::Complete(response) => Ok(Admission::Replay(response.clone())),
                EntryState::Pending => Ok(Admission::InFlight),
            },
        }
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: StoredResponse,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key.as_str()) {
            entry.state = EntryState::Complete(response);
            entry.stored_at = now;
        }
        Ok(())
    }

    async fn abandon(&self, key: &IdempotencyKey) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let is_pending = entries
            .get(key.as_str())
            .is_some_and(|entry| matches!(entry.state, EntryState::Pending));
        if is_pending {
            entries.remove(key.as_str());
        }
        Ok(())
    }
}

/// Idempotency gateway over a store
pub struct IdempotencyGateway {
    store: Arc<dyn IdempotencyStore>,
    clock: Arc<dyn Clock>,
}

impl IdempotencyGateway {
    /// Creates a gateway over the given store
    pub fn new(store: Arc<dyn IdempotencyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Admits a request key
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn begin(&self, key: &IdempotencyKey, fingerprint: &str) -> Result<Admission> {
        self.store.begin(key, fingerprint, self.clock.now()).await
    }

    /// Caches the response produced for a fresh key
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn complete(&self, key: &IdempotencyKey, response: StoredResponse) -> Result<()> {
        self.store.complete(key, response, self.clock.now()).await
    }

    /// Releases a fresh key after a failure with no cacheable response
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn abandon(&self, key: &IdempotencyKey) -> Result<()> {
        self.store.abandon(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FrozenClock;
    use chrono::TimeZone;

    fn gateway() -> (IdempotencyGateway, Arc<FrozenClock>) {
        let clock = Arc::new(FrozenClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryIdempotencyStore::new(24));
        (IdempotencyGateway::new(store, clock.clone()), clock)
    }

    fn key(s: &str) -> IdempotencyKey {
        IdempotencyKey::new(s).unwrap()
    }

    fn response() -> StoredResponse {
        StoredResponse {
            status: 202,
            content_type: "application/json".to_string(),
            body: br#"{"job_id":"x"}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_fresh_then_replay() {
        let (gateway, _clock) = gateway();
        let key = key("submit-1");

        assert_eq!(gateway.begin(&key, "fp-a").await.unwrap(), Admission::Fresh);
        gateway.complete(&key, response()).await.unwrap();

        match gateway.begin(&key, "fp-a").await.unwrap() {
            Admission::Replay(cached) => assert_eq!(cached, response()),
            other => panic!("expected replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_key_different_fingerprint_conflicts() {
        let (gateway, _clock) = gateway();
        let key = key("submit-2");

        gateway.begin(&key, "fp-a").await.unwrap();
        gateway.complete(&key, response()).await.unwrap();

        assert_eq!(
            gateway.begin(&key, "fp-b").await.unwrap(),
            Admission::Conflict
        );
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_in_flight() {
        let (gateway, _clock) = gateway();
        let key = key("submit-3");

        assert_eq!(gateway.begin(&key, "fp-a").await.unwrap(), Admission::Fresh);
        // Second arrival before complete()
        assert_eq!(
            gateway.begin(&key, "fp-a").await.unwrap(),
            Admission::InFlight
        );
    }

    #[tokio::test]
    async fn test_abandon_releases_key() {
        let (gateway, _clock) = gateway();
        let key = key("submit-4");

        gateway.begin(&key, "fp-a").await.unwrap();
        gateway.abandon(&key).await.unwrap();
        assert_eq!(gateway.begin(&key, "fp-a").await.unwrap(), Admission::Fresh);
    }

    #[tokio::test]
    async fn test_abandon_keeps_completed_entry() {
        let (gateway, _clock) = gateway();
        let key = key("submit-5");

        gateway.begin(&key, "fp-a").await.unwrap();
        gateway.complete(&key, response()).await.unwrap();
        gateway.abandon(&key).await.unwrap();

        assert!(matches!(
            gateway.begin(&key, "fp-a").await.unwrap(),
            Admission::Replay(_)
        ));
    }

    #[tokio::test]
    async fn test_entries_expire_after_retention_window() {
        let (gateway, clock) = gateway();
        let key = key("submit-6");

        gateway.begin(&key, "fp-a").await.unwrap();
        gateway.complete(&key, response()).await.unwrap();

        clock.advance(Duration::hours(23));
        assert!(matches!(
            gateway.begin(&key, "fp-a").await.unwrap(),
            Admission::Replay(_)
        ));

        clock.advance(Duration::hours(2));
        assert_eq!(gateway.begin(&key, "fp-a").await.unwrap(), Admission::Fresh);
    }
}
