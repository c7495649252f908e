//! Sliding-window request budget over a shared [`KvStore`].

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::services::clock::SharedClock;
use crate::services::kv_store::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Epoch seconds at which the current window ends
    pub reset_at: i64,
}

#[derive(Clone)]
pub struct RateBudget {
    store: Arc<dyn KvStore>,
    clock: SharedClock,
    prefix: String,
}

impl RateBudget {
    pub fn new(store: Arc<dyn KvStore>, clock: SharedClock, prefix: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            prefix: prefix.into(),
        }
    }

    /// Record one request against `key` and decide whether it fits in the window.
    ///
    /// Fails open: if the store cannot be reached the request is allowed.
    pub async fn check(&self, key: &str, window: Duration, max_requests: u64) -> RateDecision {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window_ms = window.as_millis() as i64;
        let reset_at = now.timestamp() + window.as_secs() as i64;

        // Millisecond score plus a random suffix keeps same-millisecond members distinct
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());
        let store_key = format!("{}:{}", self.prefix, key);

        match self
            .store
            .window_record(
                &store_key,
                now_ms,
                window_ms,
                member,
                window + Duration::from_secs(1),
            )
            .await
        {
            Ok(count_before) => {
                let count = count_before + 1;
                RateDecision {
                    allowed: count <= max_requests,
                    remaining: max_requests.saturating_sub(count),
                    reset_at,
                }
            }
            Err(e) => {
                warn!(key = %store_key, error = %e, "Rate limit store unavailable, allowing request");
                RateDecision {
                    allowed: true,
                    remaining: max_requests,
                    reset_at,
                }
            }
        }
    }
}
