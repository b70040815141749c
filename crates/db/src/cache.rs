//! Read-through cache over the keyed store.
//!
//! The cache is an optimization, never a source of truth: a read failure
//! or an undecodable value falls back to the authoritative query, and
//! mutations invalidate by deletion so the next read recomputes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use libris_shared::kv::KeyedStore;
use libris_shared::types::BookId;

/// TTL for a single book's detail entry.
pub const BOOK_DETAILS_TTL: Duration = Duration::from_secs(3600);

/// TTL for the unfiltered first page of the catalog.
pub const FIRST_PAGE_TTL: Duration = Duration::from_secs(86_400);

/// TTL for aggregate count entries.
pub const COUNT_TTL: Duration = Duration::from_secs(300);

/// Key of the unfiltered first catalog page. Only this page is cached;
/// deeper and filtered pages always hit the database.
pub const ALL_BOOKS_FIRST_PAGE: &str = "all_books_first_page";

/// Key of the total-members count.
pub const USERS_COUNT: &str = "users-count";

/// Key of the total-books count.
pub const BOOKS_COUNT: &str = "books-count";

/// Key of the active-loans count.
pub const ACTIVE_LOANS_COUNT: &str = "active-loans-count";

/// Key of one book's detail entry.
#[must_use]
pub fn book_details_key(id: BookId) -> String {
    format!("book-details:{id}")
}

/// Best-effort JSON cache on the keyed store.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn KeyedStore>,
}

impl QueryCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Reads and decodes a cached value. Any store or decode failure is
    /// logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store.get(key).await {
            Ok(v) => v?,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed, falling back");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                tracing::warn!(key, error = %err, "cached value undecodable, falling back");
                None
            }
        }
    }

    /// Stores a value with a TTL. Failures are logged and swallowed; the
    /// caller already has the authoritative data.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache encode failed");
                return;
            }
        };

        if let Err(err) = self.store.set(key, encoded, ttl).await {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }

    /// Deletes entries so the next read recomputes them.
    pub async fn invalidate(&self, keys: &[&str]) {
        for key in keys {
            if let Err(err) = self.store.delete(key).await {
                tracing::warn!(key, error = %err, "cache invalidation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_shared::kv::MemoryKeyedStore;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Snapshot {
        total: u64,
    }

    fn cache() -> QueryCache {
        QueryCache::new(Arc::new(MemoryKeyedStore::new()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = cache();
        cache.put(USERS_COUNT, &Snapshot { total: 42 }, COUNT_TTL).await;

        assert_eq!(
            cache.get::<Snapshot>(USERS_COUNT).await,
            Some(Snapshot { total: 42 })
        );
    }

    #[tokio::test]
    async fn absent_key_is_a_miss() {
        let cache = cache();
        assert_eq!(cache.get::<Snapshot>(BOOKS_COUNT).await, None);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = cache();
        cache
            .put(ALL_BOOKS_FIRST_PAGE, &vec!["dune"], FIRST_PAGE_TTL)
            .await;
        cache.invalidate(&[ALL_BOOKS_FIRST_PAGE]).await;

        assert_eq!(cache.get::<Vec<String>>(ALL_BOOKS_FIRST_PAGE).await, None);
    }

    #[tokio::test]
    async fn undecodable_value_reads_as_miss() {
        let store = Arc::new(MemoryKeyedStore::new());
        let cache = QueryCache::new(Arc::clone(&store) as Arc<dyn KeyedStore>);

        store
            .set(USERS_COUNT, serde_json::json!("not a snapshot"), COUNT_TTL)
            .await
            .unwrap();

        assert_eq!(cache.get::<Snapshot>(USERS_COUNT).await, None);
    }

    #[test]
    fn book_details_keys_embed_the_id() {
        let id = BookId::from_uuid(Uuid::nil());
        assert_eq!(
            book_details_key(id),
            "book-details:00000000-0000-0000-0000-000000000000"
        );
    }
}
