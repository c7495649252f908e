//! Single active session per user and client type.
//!
//! Every login stores a fresh version stamp; a token is only valid while the
//! version it carries equals the stored one, so issuing a new version revokes
//! every older token of that client type.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

use crate::models::session::ClientType;
use crate::services::clock::SharedClock;
use crate::services::kv_store::{KvError, KvStore};

pub struct SessionVersionGuard {
    store: Arc<dyn KvStore>,
    clock: SharedClock,
    ttl: Duration,
    last_version: AtomicI64,
}

impl SessionVersionGuard {
    /// `ttl` should be slightly longer than the auth token lifetime
    pub fn new(store: Arc<dyn KvStore>, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            last_version: AtomicI64::new(0),
        }
    }

    fn key(user_id: i64, client: ClientType) -> String {
        format!("session_version:{}:{}", user_id, client.as_str())
    }

    /// Nanosecond timestamp, bumped if the clock has not moved since the last issue
    fn next_version(&self) -> i64 {
        let now = self
            .clock
            .now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.clock.now().timestamp_micros() * 1_000);

        let mut prev = self.last_version.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_version.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Start a new session, replacing any active one for this client type
    pub async fn issue(&self, user_id: i64, client: ClientType) -> Result<String, KvError> {
        let version = self.next_version().to_string();
        self.store
            .set_ex(&Self::key(user_id, client), &version, self.ttl)
            .await?;
        debug!(user_id, client = %client, "Issued session version");
        Ok(version)
    }

    /// True only if a version is stored and equals the presented one.
    /// Store failures reject the session.
    pub async fn validate(&self, user_id: i64, client: ClientType, presented: &str) -> bool {
        match self.store.get(&Self::key(user_id, client)).await {
            Ok(Some(current)) => current == presented,
            Ok(None) => false,
            Err(e) => {
                error!(user_id, client = %client, error = %e, "Session store lookup failed");
                false
            }
        }
    }

    pub async fn invalidate(&self, user_id: i64, client: ClientType) -> Result<(), KvError> {
        self.store.del(&[Self::key(user_id, client)]).await?;
        Ok(())
    }

    /// Log the user out on every client type
    pub async fn invalidate_all(&self, user_id: i64) -> Result<(), KvError> {
        let keys: Vec<String> = ClientType::ALL
            .iter()
            .map(|client| Self::key(user_id, *client))
            .collect();
        self.store.del(&keys).await?;
        Ok(())
    }
}
