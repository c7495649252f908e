#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use skinmarket_backend::models::credential::ApiCredential;
use skinmarket_backend::models::platform::{Platform, PlatformRecord, PriceQuote};
use skinmarket_backend::models::prices::PriceHistoryEntry;
use skinmarket_backend::services::catalog::ProductCatalog;
use skinmarket_backend::services::clock::{ManualClock, SharedClock};
use skinmarket_backend::services::history_snapshot::HistoryStore;
use skinmarket_backend::services::key_pool::{CredentialStore, CursorStore, KeyPool};
use skinmarket_backend::services::platform_store::PlatformStore;
use skinmarket_backend::services::price_api::{PriceApiError, PriceSource};
use skinmarket_backend::services::reconciler::{BatchReconciler, ReconcilerConfig};
use skinmarket_backend::services::storage::StoreError;

pub const JOB: &str = "price_sync";
pub const START_TS: i64 = 1_760_000_000;

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_timestamp(START_TS))
}

/// `count` distinct market hash names in catalog order
pub fn product_names(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("Sticker | Test Team {:04} (Holo)", i))
        .collect()
}

pub struct MemoryCatalog {
    names: Vec<String>,
}

impl MemoryCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn market_hash_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.names.clone())
    }
}

#[derive(Default)]
pub struct MemoryPlatformStore {
    records: Mutex<HashMap<Platform, BTreeMap<String, PlatformRecord>>>,
    failing_upserts: Mutex<u32>,
    upsert_calls: Mutex<u32>,
}

impl MemoryPlatformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` upserts with a deadlock error
    pub fn fail_next_upserts(&self, count: u32) {
        *self.failing_upserts.lock() = count;
    }

    pub fn upsert_calls(&self) -> u32 {
        *self.upsert_calls.lock()
    }

    pub fn seed(&self, platform: Platform, record: PlatformRecord) {
        self.records
            .lock()
            .entry(platform)
            .or_default()
            .insert(record.market_hash_name.clone(), record);
    }

    pub fn get(&self, platform: Platform, name: &str) -> Option<PlatformRecord> {
        self.records
            .lock()
            .get(&platform)
            .and_then(|records| records.get(name).cloned())
    }

    pub fn snapshot(&self, platform: Platform) -> Vec<PlatformRecord> {
        self.records
            .lock()
            .get(&platform)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformStore for MemoryPlatformStore {
    async fn load(
        &self,
        platform: Platform,
        names: &[String],
    ) -> Result<HashMap<String, PlatformRecord>, StoreError> {
        let records = self.records.lock();
        let Some(table) = records.get(&platform) else {
            return Ok(HashMap::new());
        };
        Ok(names
            .iter()
            .filter_map(|name| table.get(name).map(|r| (name.clone(), r.clone())))
            .collect())
    }

    async fn load_all(&self, platform: Platform) -> Result<Vec<PlatformRecord>, StoreError> {
        Ok(self.snapshot(platform))
    }

    async fn upsert(&self, platform: Platform, records: &[PlatformRecord]) -> Result<(), StoreError> {
        *self.upsert_calls.lock() += 1;
        {
            let mut failing = self.failing_upserts.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Other(
                    "deadlock detected (SQLSTATE 40P01)".to_string(),
                ));
            }
        }

        let mut all = self.records.lock();
        let table = all.entry(platform).or_default();
        for record in records {
            table.insert(record.market_hash_name.clone(), record.clone());
        }
        Ok(())
    }
}

/// Credentials and cursors in one place, like the two tables they model
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<Vec<ApiCredential>>,
    cursors: Mutex<HashMap<String, i64>>,
    fail_writes: Mutex<bool>,
}

impl MemoryKeyStore {
    pub fn with_keys(keys: &[&str]) -> Self {
        let store = Self::default();
        *store.keys.lock() = keys
            .iter()
            .enumerate()
            .map(|(i, key)| ApiCredential {
                id: i as i32 + 1,
                key: key.to_string(),
                last_used: None,
                fail_count: 0,
            })
            .collect();
        store
    }

    pub fn credential(&self, key: &str) -> Option<ApiCredential> {
        self.keys.lock().iter().find(|c| c.key == key).cloned()
    }

    pub fn cursor(&self, job: &str) -> i64 {
        self.cursors.lock().get(job).copied().unwrap_or(0)
    }

    pub fn set_cursor(&self, job: &str, index: i64) {
        self.cursors.lock().insert(job.to_string(), index);
    }

    /// Every later `touch` / `record_failure` fails; cursor writes still land
    pub fn fail_key_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            return Err(StoreError::Other("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryKeyStore {
    async fn list_credentials(&self) -> Result<Vec<ApiCredential>, StoreError> {
        Ok(self.keys.lock().clone())
    }

    async fn touch(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut keys = self.keys.lock();
        let credential = keys
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| StoreError::Other(format!("Unknown API key {}", key)))?;
        credential.last_used = Some(at);
        Ok(())
    }

    async fn record_failure(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut keys = self.keys.lock();
        let credential = keys
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| StoreError::Other(format!("Unknown API key {}", key)))?;
        credential.fail_count += 1;
        credential.last_used = Some(at);
        Ok(())
    }
}

#[async_trait]
impl CursorStore for MemoryKeyStore {
    async fn load_cursor(&self, job_name: &str) -> Result<i64, StoreError> {
        Ok(self.cursor(job_name))
    }

    async fn save_cursor(&self, job_name: &str, index: i64) -> Result<(), StoreError> {
        self.set_cursor(job_name, index);
        Ok(())
    }
}

/// What the scripted upstream does for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Quotes,
    RateLimited,
    ServerError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub api_key: String,
    pub names: Vec<String>,
}

/// Upstream stand-in. Requests follow the script and fall back to
/// [`Step::Quotes`] once it runs out. Quotes cover BUFF and STEAM.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<FetchCall>>,
    observation: Mutex<(i64, i32)>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedSource {
    pub fn new(script: &[Step]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
            observation: Mutex::new((START_TS, 120)),
            gate: None,
        }
    }

    /// Every request signals `entered` and then waits for `release`
    pub fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::new(&[])
        }
    }

    /// Update time and sell count reported for every quote from now on
    pub fn observe(&self, update_time: i64, sell_count: i32) {
        *self.observation.lock() = (update_time, sell_count);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    fn quotes_for(&self, names: &[String]) -> Vec<PriceQuote> {
        let (update_time, sell_count) = *self.observation.lock();
        names
            .iter()
            .enumerate()
            .flat_map(|(i, name)| {
                [
                    PriceQuote {
                        market_hash_name: name.clone(),
                        platform: Platform::Buff,
                        platform_item_id: format!("{}", 900_000 + i),
                        sell_price: Decimal::new(1250, 2),
                        sell_count,
                        bidding_price: Decimal::new(1180, 2),
                        bidding_count: 7,
                        update_time,
                    },
                    PriceQuote {
                        market_hash_name: name.clone(),
                        platform: Platform::Steam,
                        platform_item_id: String::new(),
                        sell_price: Decimal::new(1510, 2),
                        sell_count: sell_count * 2,
                        bidding_price: Decimal::new(1320, 2),
                        bidding_count: 30,
                        update_time,
                    },
                ]
            })
            .collect()
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_batch(&self, api_key: &str, names: &[String]) -> Result<Vec<PriceQuote>, PriceApiError> {
        self.calls.lock().push(FetchCall {
            api_key: api_key.to_string(),
            names: names.to_vec(),
        });

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        let step = self.script.lock().pop_front().unwrap_or(Step::Quotes);
        match step {
            Step::Quotes => Ok(self.quotes_for(names)),
            Step::RateLimited => Err(PriceApiError::RateLimited {
                code: Some(4005),
                message: "request too frequent".to_string(),
            }),
            Step::ServerError => Err(PriceApiError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
        }
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub keys: Arc<MemoryKeyStore>,
    pub source: Arc<ScriptedSource>,
    pub store: Arc<MemoryPlatformStore>,
    pub reconciler: BatchReconciler,
}

/// Reconciler over in-memory fakes with a 60s key cooldown and no page delay
pub fn harness(names: Vec<String>, keys: &[&str], source: ScriptedSource) -> Harness {
    let clock = manual_clock();
    let keys = Arc::new(MemoryKeyStore::with_keys(keys));
    let source = Arc::new(source);
    let store = Arc::new(MemoryPlatformStore::new());
    let shared_clock: SharedClock = clock.clone();

    let pool = KeyPool::new(
        keys.clone(),
        keys.clone(),
        shared_clock.clone(),
        Duration::seconds(60),
        JOB,
    );
    let reconciler = BatchReconciler::new(
        Arc::new(MemoryCatalog::new(names)),
        pool,
        source.clone(),
        store.clone(),
        shared_clock,
        ReconcilerConfig {
            page_size: 100,
            page_delay: std::time::Duration::ZERO,
        },
    );

    Harness {
        clock,
        keys,
        source,
        store,
        reconciler,
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<BTreeMap<(String, Platform, NaiveDate), PriceHistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: PriceHistoryEntry) {
        self.rows.lock().insert(
            (entry.market_hash_name.clone(), entry.platform, entry.record_date),
            entry,
        );
    }

    pub fn rows_on(&self, date: NaiveDate) -> Vec<PriceHistoryEntry> {
        self.rows
            .lock()
            .values()
            .filter(|e| e.record_date == date)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn count_for_date(&self, platform: Platform, date: NaiveDate) -> Result<u64, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|e| e.platform == platform && e.record_date == date)
            .count() as u64)
    }

    async fn insert_new(&self, entries: &[PriceHistoryEntry]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let mut written = 0;
        for entry in entries {
            let key = (entry.market_hash_name.clone(), entry.platform, entry.record_date);
            if !rows.contains_key(&key) {
                rows.insert(key, entry.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn prune_before(&self, date: NaiveDate) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, e| e.record_date >= date);
        Ok((before - rows.len()) as u64)
    }

    async fn history_for(
        &self,
        market_hash_name: &str,
        since: NaiveDate,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|e| e.market_hash_name == market_hash_name && e.record_date >= since)
            .cloned()
            .collect())
    }
}

/// Observed record as the reconciler would have written it
pub fn observed_record(name: &str, sell_price: Decimal, sell_count: i32, update_time: i64) -> PlatformRecord {
    PlatformRecord {
        sell_price,
        sell_count,
        update_time,
        before_time: update_time,
        before_count: sell_count,
        turn_over: sell_count,
        ..PlatformRecord::empty(name)
    }
}
