//! Batch price reconciliation.
//!
//! One pass walks the product catalog in pages of [`MAX_BATCH_SIZE`] names,
//! fetches each page from the upstream aggregator with a rotated API key,
//! merges the returned quotes into the per-platform records (applying the
//! turnover rule) and upserts them. Pages are processed strictly in order so
//! the persisted cursor always names the next page to fetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::platform::{Platform, PlatformRecord, PriceQuote};
use crate::services::catalog::ProductCatalog;
use crate::services::clock::SharedClock;
use crate::services::key_pool::{mask_key, KeyPool, KeySelection};
use crate::services::platform_store::PlatformStore;
use crate::services::price_api::{PriceApiError, PriceSource, MAX_BATCH_SIZE};
use crate::services::retry::{retry_with, RetryPolicy};
use crate::services::storage::StoreError;
use crate::services::turnover;

/// Upsert attempts on deadlock / serialization failure
const UPSERT_RETRY: RetryPolicy = RetryPolicy::linear(3, Duration::from_millis(100));

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to load product catalog: {0}")]
    Catalog(StoreError),
    #[error("Key pool storage error: {0}")]
    KeyPool(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    /// No eligible key; the cursor was saved at `at_page`
    KeysExhausted { at_page: usize },
    /// Page 0 of a full scan failed; nothing to reconcile
    Aborted { at_page: usize, reason: String },
    /// Another pass held the guard
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pages_total: usize,
    pub start_page: usize,
    pub pages_done: usize,
    pub pages_skipped: usize,
    pub records_written: usize,
    pub outcome: PassOutcome,
}

impl PassReport {
    fn new(pages_total: usize, start_page: usize) -> Self {
        Self {
            pages_total,
            start_page,
            pages_done: 0,
            pages_skipped: 0,
            records_written: 0,
            outcome: PassOutcome::Completed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub page_size: usize,
    /// Self-throttle between page requests
    pub page_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_BATCH_SIZE,
            page_delay: Duration::from_secs(2),
        }
    }
}

pub struct BatchReconciler {
    catalog: Arc<dyn ProductCatalog>,
    keys: KeyPool,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PlatformStore>,
    clock: SharedClock,
    config: ReconcilerConfig,
    running: Mutex<()>,
}

/// Merge one upstream quote into the stored record (zeroed if absent).
/// Quotes without an update time are stamped with `observed_at`.
pub fn merge_quote(existing: Option<PlatformRecord>, quote: &PriceQuote, observed_at: i64) -> PlatformRecord {
    let mut record = existing.unwrap_or_else(|| PlatformRecord::empty(&quote.market_hash_name));

    // Keep a resolved id when upstream omits it for this observation
    if !quote.platform_item_id.is_empty() {
        record.platform_item_id = quote.platform_item_id.clone();
    }
    record.sell_price = quote.sell_price;
    record.sell_count = quote.sell_count;
    record.bidding_price = quote.bidding_price;
    record.bidding_count = quote.bidding_count;
    record.update_time = if quote.update_time > 0 {
        quote.update_time
    } else {
        observed_at
    };
    turnover::apply(&mut record);
    record.link = quote
        .platform
        .link(&record.platform_item_id, &record.market_hash_name);

    record
}

impl BatchReconciler {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        keys: KeyPool,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PlatformStore>,
        clock: SharedClock,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            catalog,
            keys,
            source,
            store,
            clock,
            config,
            running: Mutex::new(()),
        }
    }

    /// Run one reconciliation pass. Overlapping calls return
    /// [`PassOutcome::AlreadyRunning`] instead of interleaving.
    pub async fn run(&self) -> Result<PassReport, ReconcileError> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Price reconciliation already running, skipping this tick");
            let mut report = PassReport::new(0, 0);
            report.outcome = PassOutcome::AlreadyRunning;
            return Ok(report);
        };

        let names = self
            .catalog
            .market_hash_names()
            .await
            .map_err(ReconcileError::Catalog)?;

        let page_size = self.config.page_size.clamp(1, MAX_BATCH_SIZE);
        let pages_total = names.len().div_ceil(page_size);
        if pages_total == 0 {
            info!("No products in catalog, nothing to reconcile");
            return Ok(PassReport::new(0, 0));
        }

        let cursor = self.keys.get_cursor().await?;
        let start_page = if cursor < 0 || cursor as usize >= pages_total {
            0
        } else {
            cursor as usize
        };

        info!(
            products = names.len(),
            pages_total,
            start_page,
            "Starting price reconciliation pass"
        );

        let mut report = PassReport::new(pages_total, start_page);
        let mut turn = 0usize;

        for page in start_page..pages_total {
            let selection = match self.keys.select(turn).await {
                Ok(selection) => selection,
                Err(e) => return Err(self.fail_at(page, e).await),
            };
            let (key, is_last_key) = match selection {
                KeySelection::Exhausted => {
                    self.keys.set_cursor(page as i64).await?;
                    info!(page, pages_total, "All API keys cooling down, pausing pass");
                    report.outcome = PassOutcome::KeysExhausted { at_page: page };
                    return Ok(report);
                }
                KeySelection::Spare(key) => (key, false),
                KeySelection::Last(key) => (key, true),
            };
            turn += 1;

            // The last eligible key starts its cooldown as soon as it is spent
            if is_last_key {
                if let Err(e) = self.keys.mark_used(&key.key).await {
                    return Err(self.fail_at(page, e).await);
                }
            }

            let start = page * page_size;
            let chunk = &names[start..(start + page_size).min(names.len())];

            match self.source.fetch_batch(&key.key, chunk).await {
                Ok(quotes) => {
                    report.records_written += self.merge_page(page, quotes).await;
                    report.pages_done += 1;
                }
                Err(e) => {
                    let rate_limited = matches!(e, PriceApiError::RateLimited { .. });
                    let bookkeeping = if rate_limited {
                        warn!(page, key = %mask_key(&key.key), error = %e, "API key rate limited, skipping page");
                        if is_last_key {
                            Ok(())
                        } else {
                            self.keys.mark_used(&key.key).await
                        }
                    } else {
                        warn!(page, key = %mask_key(&key.key), error = %e, "Price page request failed");
                        self.keys.record_failure(&key.key).await
                    };
                    if let Err(store_err) = bookkeeping {
                        return Err(self.fail_at(page, store_err).await);
                    }

                    // Only the start of a full scan aborts; a resumed pass skips a bad page
                    if page == 0 && !rate_limited {
                        self.keys.set_cursor(page as i64).await?;
                        error!(page, error = %e, "First catalog page failed, aborting reconciliation");
                        report.outcome = PassOutcome::Aborted {
                            at_page: page,
                            reason: e.to_string(),
                        };
                        return Ok(report);
                    }

                    report.pages_skipped += 1;
                }
            }

            if page + 1 < pages_total && !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }

        self.keys.set_cursor(0).await?;
        info!(
            pages_done = report.pages_done,
            pages_skipped = report.pages_skipped,
            records_written = report.records_written,
            "Price reconciliation pass complete"
        );
        Ok(report)
    }

    /// Save `page` as the resume point before surfacing a key pool error
    async fn fail_at(&self, page: usize, err: StoreError) -> ReconcileError {
        if let Err(e) = self.keys.set_cursor(page as i64).await {
            error!(page, error = %e, "Failed to save cursor after key pool error");
        }
        ReconcileError::KeyPool(err)
    }

    /// Merge a page of quotes into every platform's records and upsert them.
    /// Returns the number of records written.
    async fn merge_page(&self, page: usize, quotes: Vec<PriceQuote>) -> usize {
        let mut by_platform: HashMap<Platform, Vec<PriceQuote>> = HashMap::new();
        for quote in quotes {
            by_platform.entry(quote.platform).or_default().push(quote);
        }

        let observed_at = self.clock.now().timestamp();
        let mut written = 0;
        for platform in Platform::ALL {
            let Some(quotes) = by_platform.remove(&platform) else {
                continue;
            };

            let names: Vec<String> = quotes.iter().map(|q| q.market_hash_name.clone()).collect();
            let mut existing = match self.store.load(platform, &names).await {
                Ok(existing) => existing,
                Err(e) => {
                    error!(page, platform = %platform, error = %e, "Failed to load platform records");
                    continue;
                }
            };

            // Duplicate quotes for a name collapse to the last one
            let mut merged: BTreeMap<String, PlatformRecord> = BTreeMap::new();
            for quote in &quotes {
                let prior = merged
                    .remove(&quote.market_hash_name)
                    .or_else(|| existing.remove(&quote.market_hash_name));
                merged.insert(quote.market_hash_name.clone(), merge_quote(prior, quote, observed_at));
            }
            let records: Vec<PlatformRecord> = merged.into_values().collect();

            let result = retry_with(
                UPSERT_RETRY,
                &format!("Upsert {} page {}", platform, page),
                StoreError::is_transient,
                |_| self.store.upsert(platform, &records),
            )
            .await;

            match result {
                Ok(()) => {
                    debug!(page, platform = %platform, count = records.len(), "Upserted platform records");
                    written += records.len();
                }
                Err(e) => {
                    error!(page, platform = %platform, error = %e, "Failed to upsert platform records");
                }
            }
        }

        written
    }
}
