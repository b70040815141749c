//! TTL-capable keyed store.
//!
//! One store serves three consumers: read-through caches, OTP codes, and
//! rate-limit counters. Expiry is owned by the store itself; callers never
//! run their own timers. Values are JSON so structured data round-trips.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Keyed store errors.
#[derive(Debug, Error)]
pub enum KeyedStoreError {
    /// The backing store could not be reached.
    #[error("keyed store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be decoded.
    #[error("stored value could not be decoded: {0}")]
    Codec(String),
}

/// Counter state returned by [`KeyedStore::incr_with_expiry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// The counter value after this increment.
    pub count: u64,
    /// Time remaining until the counter's window expires.
    pub expires_in: Duration,
}

/// TTL key/value store port.
///
/// Implementations must make [`incr_with_expiry`](Self::incr_with_expiry)
/// atomic per key; everything else may be eventually consistent.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Returns the live value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, KeyedStoreError>;

    /// Stores `value` at `key` with the given time-to-live, replacing any
    /// previous value and its expiry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), KeyedStoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KeyedStoreError>;

    /// Atomically increments the counter at `key`. The first increment in a
    /// window sets the expiry to `ttl`; later increments leave it untouched.
    /// A counter whose window has elapsed restarts at one.
    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CounterState, KeyedStoreError>;
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process [`KeyedStore`] on a concurrent map.
///
/// Expired entries are dropped lazily when touched. Suitable for a
/// single-node deployment and for tests; swap in a networked store behind
/// the same trait for anything larger.
#[derive(Default)]
pub struct MemoryKeyedStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKeyedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    /// Returns `true` if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyedStore for MemoryKeyedStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KeyedStoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at <= Instant::now() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), KeyedStoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KeyedStoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CounterState, KeyedStoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so the expiry check and the
        // increment are atomic per key.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: Value::from(0u64),
                expires_at: now + ttl,
            });

        if entry.expires_at <= now {
            entry.value = Value::from(0u64);
            entry.expires_at = now + ttl;
        }

        let count = entry.value.as_u64().unwrap_or(0) + 1;
        entry.value = Value::from(count);
        let expires_in = entry.expires_at.saturating_duration_since(now);

        Ok(CounterState { count, expires_in })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips_structured_values() {
        let store = MemoryKeyedStore::new();
        let value = json!({"title": "Dune", "available": 3});

        store
            .set("book-details:1", value.clone(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("book-details:1").await.unwrap(), Some(value));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryKeyedStore::new();
        store
            .set("otp:reader@example.com", json!("123456"), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get("otp:reader@example.com").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("otp:reader@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let store = MemoryKeyedStore::new();
        store
            .set("k", json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Deleting an absent key is fine.
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn set_overwrites_previous_value_and_ttl() {
        let store = MemoryKeyedStore::new();
        store
            .set("k", json!("old"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("k", json!("new"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn counter_increments_within_window() {
        let store = MemoryKeyedStore::new();
        let window = Duration::from_secs(60);

        for expected in 1..=3 {
            let state = store.incr_with_expiry("ratelimit:ip", window).await.unwrap();
            assert_eq!(state.count, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counter_window_is_fixed_not_sliding() {
        let store = MemoryKeyedStore::new();
        let window = Duration::from_secs(60);

        let first = store.incr_with_expiry("k", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.expires_in, window);

        // A later increment must not push the window boundary out.
        tokio::time::advance(Duration::from_secs(59)).await;
        let second = store.incr_with_expiry("k", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.expires_in, Duration::from_secs(1));

        // Once the boundary passes, the counter restarts.
        tokio::time::advance(Duration::from_secs(2)).await;
        let third = store.incr_with_expiry("k", window).await.unwrap();
        assert_eq!(third.count, 1);
        assert_eq!(third.expires_in, window);
    }
}
