//! Fixed-window rate limiting over a keyed store.
//!
//! Each key gets a counter that lives for one window. The first hit
//! creates the counter with the window TTL; later hits within the window
//! increment it without touching the expiry, so the window never slides.
//! When the counter expires, the next hit starts a fresh window.

use std::sync::Arc;
use std::time::Duration;

use libris_shared::KeyedStore;

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

/// Fixed-window limiter keyed by an arbitrary string.
pub struct FixedWindowLimiter {
    store: Arc<dyn KeyedStore>,
    max_requests: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    /// Creates a limiter allowing `max_requests` per `window` per key.
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Counts a request against `key` and decides whether it may proceed.
    ///
    /// The increment happens first, so a denied request still consumes
    /// nothing extra: the counter only ever moves by one per call. If
    /// the store is unreachable the limiter fails closed and denies the
    /// request.
    pub async fn allow(&self, key: &str) -> RateLimitDecision {
        let counter_key = format!("ratelimit:{key}");
        match self.store.incr_with_expiry(&counter_key, self.window).await {
            Ok(state) => RateLimitDecision {
                allowed: state.count <= self.max_requests,
                remaining: self.max_requests.saturating_sub(state.count),
                reset_after: state.expires_in,
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "rate limit store unavailable, denying");
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_after: self.window,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use libris_shared::{CounterState, KeyedStoreError, MemoryKeyedStore};
    use serde_json::Value;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new(Arc::new(MemoryKeyedStore::new()), 5, WINDOW)
    }

    #[tokio::test]
    async fn allows_up_to_the_limit_then_denies() {
        let limiter = limiter();
        for i in 0..5 {
            let decision = limiter.allow("1.2.3.4").await;
            assert!(decision.allowed, "request {} should pass", i + 1);
        }
        let decision = limiter.allow("1.2.3.4").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = limiter();
        assert_eq!(limiter.allow("k").await.remaining, 4);
        assert_eq!(limiter.allow("k").await.remaining, 3);
        assert_eq!(limiter.allow("k").await.remaining, 2);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter();
        for _ in 0..6 {
            limiter.allow("1.2.3.4").await;
        }
        assert!(!limiter.allow("1.2.3.4").await.allowed);
        assert!(limiter.allow("5.6.7.8").await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = limiter();
        for _ in 0..6 {
            limiter.allow("k").await;
        }
        assert!(!limiter.allow("k").await.allowed);

        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;
        let decision = limiter.allow("k").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_fixed_not_sliding() {
        let limiter = limiter();
        limiter.allow("k").await;

        // Traffic near the end of the window must not extend it.
        tokio::time::advance(Duration::from_secs(55)).await;
        for _ in 0..5 {
            limiter.allow("k").await;
        }
        assert!(!limiter.allow("k").await.allowed);

        // The window started at t=0, so it ends at t=60 regardless.
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.allow("k").await.allowed);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyedStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, KeyedStoreError> {
            Err(KeyedStoreError::Unavailable("down".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: Value,
            _ttl: Duration,
        ) -> Result<(), KeyedStoreError> {
            Err(KeyedStoreError::Unavailable("down".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), KeyedStoreError> {
            Err(KeyedStoreError::Unavailable("down".into()))
        }

        async fn incr_with_expiry(
            &self,
            _key: &str,
            _ttl: Duration,
        ) -> Result<CounterState, KeyedStoreError> {
            Err(KeyedStoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_denies_the_request() {
        let limiter = FixedWindowLimiter::new(Arc::new(FailingStore), 5, WINDOW);
        let decision = limiter.allow("k").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_after, WINDOW);
    }
}
