//! Price Sync Job
//!
//! Periodically runs a [`BatchReconciler`] pass and records the outcome in
//! `sync_status`.

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::jobs::supervisor::spawn_periodic;
use crate::services::reconciler::{BatchReconciler, PassOutcome};
use crate::services::sync_status::{self, jobs};

pub fn start_price_sync_job(
    db: DatabaseConnection,
    reconciler: Arc<BatchReconciler>,
    period: Duration,
) -> JoinHandle<()> {
    spawn_periodic(jobs::PRICE_SYNC, period, move || {
        let db = db.clone();
        let reconciler = reconciler.clone();
        async move {
            let result = reconciler.run().await;

            let status = match &result {
                Ok(report) => match &report.outcome {
                    PassOutcome::Completed => {
                        info!(
                            pages = report.pages_done,
                            skipped = report.pages_skipped,
                            records = report.records_written,
                            "Price sync completed"
                        );
                        sync_status::record_success(&db, jobs::PRICE_SYNC).await
                    }
                    PassOutcome::KeysExhausted { at_page } => {
                        info!(at_page, pages = report.pages_done, "Price sync paused until keys cool down");
                        sync_status::record_success(&db, jobs::PRICE_SYNC).await
                    }
                    PassOutcome::Aborted { at_page, reason } => {
                        sync_status::record_failure(
                            &db,
                            jobs::PRICE_SYNC,
                            &format!("aborted at page {}: {}", at_page, reason),
                        )
                        .await
                    }
                    PassOutcome::AlreadyRunning => Ok(()),
                },
                Err(e) => {
                    error!(error = %e, "Price sync failed");
                    sync_status::record_failure(&db, jobs::PRICE_SYNC, &e.to_string()).await
                }
            };

            if let Err(e) = status {
                warn!(error = %e, "Failed to record price sync status");
            }
        }
    })
}
