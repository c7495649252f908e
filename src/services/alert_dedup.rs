//! Suppression of duplicate operational alerts.
//!
//! Each alert is fingerprinted by level, message and source location. A
//! fingerprint that was sent less than `cooldown` ago is dropped, a global
//! per-minute budget caps total sends, and with a batch window configured
//! accepted alerts are queued for the next flush instead of sent at once.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use crate::services::clock::SharedClock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub level: String,
    pub message: String,
    /// Structured event fields (`key=value ...`), shown but not fingerprinted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fields: String,
    /// `file:line` of the event, or its target when unknown
    pub source: String,
    pub at: DateTime<Utc>,
}

impl AlertEntry {
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.level.hash(&mut hasher);
        self.message.hash(&mut hasher);
        self.source.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RateLimited,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    SendNow,
    Enqueued,
    Dropped(DropReason),
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub cooldown: Duration,
    pub max_per_minute: usize,
    /// `None` sends accepted alerts immediately
    pub batch_window: Option<Duration>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(5),
            max_per_minute: 10,
            batch_window: None,
        }
    }
}

#[derive(Default)]
struct DedupState {
    last_sent: HashMap<u64, DateTime<Utc>>,
    recent_sends: VecDeque<DateTime<Utc>>,
    queue: Vec<AlertEntry>,
}

pub struct AlertDeduplicator {
    config: AlertConfig,
    clock: SharedClock,
    state: Mutex<DedupState>,
}

impl AlertDeduplicator {
    pub fn new(config: AlertConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(DedupState::default()),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn offer(&self, entry: &AlertEntry) -> AlertDecision {
        let now = self.clock.now();
        let fingerprint = entry.fingerprint();
        let mut state = self.state.lock();

        let minute_ago = now - Duration::minutes(1);
        while state.recent_sends.front().is_some_and(|at| *at <= minute_ago) {
            state.recent_sends.pop_front();
        }
        if state.recent_sends.len() >= self.config.max_per_minute {
            return AlertDecision::Dropped(DropReason::RateLimited);
        }

        if let Some(last) = state.last_sent.get(&fingerprint) {
            if now - *last < self.config.cooldown {
                return AlertDecision::Dropped(DropReason::Cooldown);
            }
        }

        state.last_sent.insert(fingerprint, now);
        state.recent_sends.push_back(now);

        if self.config.batch_window.is_some() {
            state.queue.push(entry.clone());
            AlertDecision::Enqueued
        } else {
            AlertDecision::SendNow
        }
    }

    /// Take everything queued since the last flush
    pub fn take_batch(&self) -> Vec<AlertEntry> {
        std::mem::take(&mut self.state.lock().queue)
    }

    /// Forget fingerprints last sent more than twice the cooldown ago
    pub fn prune(&self) -> usize {
        let cutoff = self.clock.now() - self.config.cooldown * 2;
        let mut state = self.state.lock();
        let before = state.last_sent.len();
        state.last_sent.retain(|_, at| *at > cutoff);
        before - state.last_sent.len()
    }

    pub fn tracked_fingerprints(&self) -> usize {
        self.state.lock().last_sent.len()
    }
}
