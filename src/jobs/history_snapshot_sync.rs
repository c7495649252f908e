//! Daily History Snapshot Job
//!
//! Ticks hourly; the snapshotter writes at most once per platform per day,
//! so the first tick after midnight UTC records the new day.

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::jobs::supervisor::spawn_periodic;
use crate::services::history_snapshot::DailyHistorySnapshotter;
use crate::services::sync_status::{self, jobs};

/// Default tick interval in seconds (1 hour)
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 3600;

pub fn start_history_snapshot_job(
    db: DatabaseConnection,
    snapshotter: Arc<DailyHistorySnapshotter>,
    period: Duration,
) -> JoinHandle<()> {
    spawn_periodic(jobs::HISTORY_SNAPSHOT, period, move || {
        let db = db.clone();
        let snapshotter = snapshotter.clone();
        async move {
            let status = match snapshotter.run().await {
                Ok(report) => {
                    if report.total_written() > 0 {
                        info!(
                            written = report.total_written(),
                            pruned = report.pruned,
                            "Daily history snapshot recorded"
                        );
                        sync_status::record_success(&db, jobs::HISTORY_SNAPSHOT).await
                    } else {
                        Ok(())
                    }
                }
                Err(e) => {
                    error!(error = %e, "Daily history snapshot failed");
                    sync_status::record_failure(&db, jobs::HISTORY_SNAPSHOT, &e.to_string()).await
                }
            };

            if let Err(e) = status {
                warn!(error = %e, "Failed to record history snapshot status");
            }
        }
    })
}

