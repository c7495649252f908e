// src/lib.rs

use std::sync::Arc;
use std::time::Duration;

use services::{
    clock::SharedClock, history_snapshot::HistoryStore, platform_store::PlatformStore, rate_budget::RateBudget,
    session_guard::SessionVersionGuard,
};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub platforms: Arc<dyn PlatformStore>,
    pub history: Arc<dyn HistoryStore>,
    pub clock: SharedClock,
    pub rate_budget: RateBudget,
    pub rate_limit: RateLimitSettings,
    /// Consumed by the authentication layer on login and on every request
    pub sessions: Arc<SessionVersionGuard>,
}

pub mod entities {
    pub mod prelude;
    pub mod api_credentials;
    pub mod buff_items;
    pub mod c5_items;
    pub mod price_history;
    pub mod products;
    pub mod steam_items;
    pub mod sync_status;
    pub mod youpin_items;
}

pub mod services {
    pub mod alert_dedup;
    pub mod alert_dispatch;
    pub mod catalog;
    pub mod clock;
    pub mod history_snapshot;
    pub mod key_pool;
    pub mod kv_store;
    pub mod platform_store;
    pub mod price_api;
    pub mod rate_budget;
    pub mod reconciler;
    pub mod retry;
    pub mod session_guard;
    pub mod storage;
    pub mod sync_status;
    pub mod turnover;
}

pub mod config;
pub mod handlers;
pub mod jobs;
pub mod models;
