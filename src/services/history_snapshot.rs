//! Daily price history snapshots.
//!
//! Once per calendar day (UTC) the current sell price and count of every
//! observed product on every platform is appended to `price_history`.
//! Idempotence is per platform and per row: a platform whose rows for today
//! are already complete is skipped, and partial days are topped up with an
//! insert that ignores rows already present, so a restart mid-snapshot
//! resumes instead of losing the rest of the day.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::entities::{prelude::PriceHistory, price_history};
use crate::models::platform::Platform;
use crate::models::prices::PriceHistoryEntry;
use crate::services::clock::SharedClock;
use crate::services::platform_store::PlatformStore;
use crate::services::storage::StoreError;

const INSERT_CHUNK: usize = 1000;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read {platform} records: {source}")]
    Platform { platform: Platform, source: StoreError },
    #[error("History storage error: {0}")]
    History(#[from] StoreError),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn count_for_date(&self, platform: Platform, date: NaiveDate) -> Result<u64, StoreError>;

    /// Insert entries, ignoring any already recorded for the same day.
    /// Returns the number of rows actually written.
    async fn insert_new(&self, entries: &[PriceHistoryEntry]) -> Result<u64, StoreError>;

    /// Delete rows recorded before `date`
    async fn prune_before(&self, date: NaiveDate) -> Result<u64, StoreError>;

    async fn history_for(
        &self,
        market_hash_name: &str,
        since: NaiveDate,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub date: Option<NaiveDate>,
    pub written: BTreeMap<Platform, u64>,
    pub skipped: Vec<Platform>,
    pub pruned: u64,
}

impl SnapshotReport {
    pub fn total_written(&self) -> u64 {
        self.written.values().sum()
    }
}

pub struct DailyHistorySnapshotter {
    platforms: Arc<dyn PlatformStore>,
    history: Arc<dyn HistoryStore>,
    clock: SharedClock,
    retention_days: i64,
}

impl DailyHistorySnapshotter {
    pub fn new(
        platforms: Arc<dyn PlatformStore>,
        history: Arc<dyn HistoryStore>,
        clock: SharedClock,
        retention_days: i64,
    ) -> Self {
        Self {
            platforms,
            history,
            clock,
            retention_days,
        }
    }

    pub async fn run(&self) -> Result<SnapshotReport, SnapshotError> {
        let today = self.clock.now().date_naive();
        let mut report = SnapshotReport {
            date: Some(today),
            ..SnapshotReport::default()
        };

        for platform in Platform::ALL {
            let entries: Vec<PriceHistoryEntry> = self
                .platforms
                .load_all(platform)
                .await
                .map_err(|source| SnapshotError::Platform { platform, source })?
                .into_iter()
                .filter(|record| record.update_time > 0)
                .map(|record| PriceHistoryEntry {
                    market_hash_name: record.market_hash_name,
                    platform,
                    sell_price: record.sell_price,
                    sell_count: record.sell_count,
                    record_date: today,
                })
                .collect();

            let recorded = self.history.count_for_date(platform, today).await?;
            if recorded >= entries.len() as u64 {
                debug!(platform = %platform, date = %today, recorded, "History already recorded today");
                report.skipped.push(platform);
                continue;
            }

            let mut written = 0;
            for chunk in entries.chunks(INSERT_CHUNK) {
                written += self.history.insert_new(chunk).await?;
            }
            info!(platform = %platform, date = %today, written, "Recorded daily price history");
            report.written.insert(platform, written);
        }

        if self.retention_days > 0 {
            let cutoff = today - Duration::days(self.retention_days);
            match self.history.prune_before(cutoff).await {
                Ok(pruned) => {
                    report.pruned = pruned;
                    if pruned > 0 {
                        info!(pruned, cutoff = %cutoff, "Pruned old price history");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to prune price history"),
            }
        }

        Ok(report)
    }
}

pub struct SeaOrmHistoryStore {
    db: DatabaseConnection,
}

impl SeaOrmHistoryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HistoryStore for SeaOrmHistoryStore {
    async fn count_for_date(&self, platform: Platform, date: NaiveDate) -> Result<u64, StoreError> {
        Ok(PriceHistory::find()
            .filter(price_history::Column::Platform.eq(platform.as_str()))
            .filter(price_history::Column::RecordDate.eq(date))
            .count(&self.db)
            .await?)
    }

    async fn insert_new(&self, entries: &[PriceHistoryEntry]) -> Result<u64, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let models = entries.iter().map(|entry| price_history::ActiveModel {
            id: NotSet,
            market_hash_name: Set(entry.market_hash_name.clone()),
            platform: Set(entry.platform.as_str().to_string()),
            sell_price: Set(entry.sell_price),
            sell_count: Set(entry.sell_count),
            record_date: Set(entry.record_date),
        });

        let inserted = PriceHistory::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    price_history::Column::MarketHashName,
                    price_history::Column::Platform,
                    price_history::Column::RecordDate,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(inserted)
    }

    async fn prune_before(&self, date: NaiveDate) -> Result<u64, StoreError> {
        let result = PriceHistory::delete_many()
            .filter(price_history::Column::RecordDate.lt(date))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn history_for(
        &self,
        market_hash_name: &str,
        since: NaiveDate,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let rows = PriceHistory::find()
            .filter(price_history::Column::MarketHashName.eq(market_hash_name))
            .filter(price_history::Column::RecordDate.gte(since))
            .order_by_asc(price_history::Column::RecordDate)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(PriceHistoryEntry {
                    platform: Platform::from_tag(&row.platform)?,
                    market_hash_name: row.market_hash_name,
                    sell_price: row.sell_price,
                    sell_count: row.sell_count,
                    record_date: row.record_date,
                })
            })
            .collect())
    }
}
