//! Key-value store seam used by the rate limiter and the session guard.
//!
//! Every operation on [`MemoryKvStore`] runs inside one critical section, so
//! multi-step operations such as [`KvStore::window_record`] are atomic with
//! respect to concurrent callers on the same key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;

use crate::services::clock::SharedClock;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("KV store unavailable: {0}")]
    Unavailable(String),
    #[error("Wrong value type for key {0}")]
    WrongType(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64, KvError>;

    /// Sliding-window record on a sorted set, executed as one unit:
    /// drop members scored at or below `now_ms - window_ms`, count the rest,
    /// add `member` scored `now_ms`, and refresh the key's expiry to `ttl`.
    ///
    /// Returns the count taken before the insert.
    async fn window_record(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: String,
        ttl: Duration,
    ) -> Result<u64, KvError>;
}

#[derive(Debug)]
enum Value {
    Str(String),
    SortedSet(BTreeSet<(i64, String)>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`KvStore`] with TTL support
pub struct MemoryKvStore {
    clock: SharedClock,
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryKvStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .map(|ttl| self.clock.now() + ttl)
    }

    /// Drop expired keys; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now));
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now();
        let mut slots = self.slots.lock();

        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
            return Ok(None);
        }

        match slots.get(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(KvError::WrongType(key.to_string())),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let expires_at = self.expiry(ttl);
        self.slots.lock().insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, KvError> {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        let removed = keys
            .iter()
            .filter_map(|key| slots.remove(key))
            .filter(|slot| !slot.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn window_record(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: String,
        ttl: Duration,
    ) -> Result<u64, KvError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut slots = self.slots.lock();

        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::SortedSet(BTreeSet::new()),
            expires_at,
        });
        if slot.is_expired(now) {
            slot.value = Value::SortedSet(BTreeSet::new());
        }

        let Value::SortedSet(set) = &mut slot.value else {
            return Err(KvError::WrongType(key.to_string()));
        };

        let cutoff = now_ms - window_ms;
        set.retain(|(score, _)| *score > cutoff);
        let count_before = set.len() as u64;
        set.insert((now_ms, member));
        slot.expires_at = expires_at;

        Ok(count_before)
    }
}
