//! Sync status service: per-job run bookkeeping and the persisted page cursor.
//!
//! The cursor lives on the job's `sync_status` row so it survives restarts
//! and is read back by the next pass after a key-exhaustion stop.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::sync_status::{self, Entity as SyncStatus};
use crate::services::key_pool::CursorStore;
use crate::services::storage::StoreError;

/// Job names for tracking sync status
pub mod jobs {
    pub const PRICE_SYNC: &str = "price_sync";
    pub const HISTORY_SNAPSHOT: &str = "history_snapshot";
}

async fn find(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<Option<sync_status::Model>, StoreError> {
    Ok(SyncStatus::find()
        .filter(sync_status::Column::JobName.eq(job_name))
        .one(db)
        .await?)
}

fn new_record(job_name: &str) -> sync_status::ActiveModel {
    sync_status::ActiveModel {
        job_name: Set(job_name.to_string()),
        success_count: Set(0),
        error_count: Set(0),
        cursor_index: Set(0),
        ..Default::default()
    }
}

/// Record a successful run
pub async fn record_success(db: &DatabaseConnection, job_name: &str) -> Result<(), StoreError> {
    let now = Utc::now().naive_utc();

    match find(db, job_name).await? {
        Some(record) => {
            let success_count = record.success_count;
            let mut active_model: sync_status::ActiveModel = record.into();
            active_model.last_success_at = Set(Some(now));
            active_model.last_attempt_at = Set(Some(now));
            active_model.last_error = Set(None);
            active_model.success_count = Set(success_count + 1);
            active_model.update(db).await?;
        }
        None => {
            let mut new_record = new_record(job_name);
            new_record.last_success_at = Set(Some(now));
            new_record.last_attempt_at = Set(Some(now));
            new_record.success_count = Set(1);
            new_record.insert(db).await?;
        }
    }

    tracing::debug!("[{}] Recorded successful sync", job_name);
    Ok(())
}

/// Record a failed run
pub async fn record_failure(
    db: &DatabaseConnection,
    job_name: &str,
    error: &str,
) -> Result<(), StoreError> {
    let now = Utc::now().naive_utc();

    match find(db, job_name).await? {
        Some(record) => {
            let error_count = record.error_count;
            let mut active_model: sync_status::ActiveModel = record.into();
            active_model.last_attempt_at = Set(Some(now));
            active_model.last_error = Set(Some(error.to_string()));
            active_model.error_count = Set(error_count + 1);
            active_model.update(db).await?;
        }
        None => {
            let mut new_record = new_record(job_name);
            new_record.last_attempt_at = Set(Some(now));
            new_record.last_error = Set(Some(error.to_string()));
            new_record.error_count = Set(1);
            new_record.insert(db).await?;
        }
    }

    tracing::debug!("[{}] Recorded failed sync: {}", job_name, error);
    Ok(())
}

/// Page index the job should resume from; 0 when never recorded
pub async fn load_cursor(db: &DatabaseConnection, job_name: &str) -> Result<i64, StoreError> {
    Ok(find(db, job_name)
        .await?
        .map(|record| record.cursor_index)
        .unwrap_or(0))
}

pub async fn save_cursor(
    db: &DatabaseConnection,
    job_name: &str,
    index: i64,
) -> Result<(), StoreError> {
    match find(db, job_name).await? {
        Some(record) => {
            let mut active_model: sync_status::ActiveModel = record.into();
            active_model.cursor_index = Set(index);
            active_model.update(db).await?;
        }
        None => {
            let mut new_record = new_record(job_name);
            new_record.cursor_index = Set(index);
            new_record.insert(db).await?;
        }
    }

    tracing::debug!("[{}] Saved cursor at page {}", job_name, index);
    Ok(())
}

/// [`CursorStore`] backed by the `sync_status` table
pub struct SyncStatusCursorStore {
    db: DatabaseConnection,
}

impl SyncStatusCursorStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CursorStore for SyncStatusCursorStore {
    async fn load_cursor(&self, job_name: &str) -> Result<i64, StoreError> {
        load_cursor(&self.db, job_name).await
    }

    async fn save_cursor(&self, job_name: &str, index: i64) -> Result<(), StoreError> {
        save_cursor(&self.db, job_name, index).await
    }
}
