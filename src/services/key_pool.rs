//! Upstream API key rotation and the resumable page cursor.
//!
//! A key is eligible once it has been idle for longer than the cooldown.
//! Selection follows a small state machine over the eligible set:
//!
//! * several keys eligible ([`KeySelection::Spare`]): rotate through them
//!   without starting a cooldown, so load is spread before any key rests;
//! * exactly one key eligible ([`KeySelection::Last`]): the caller marks it
//!   used before the request, so the pass yields once it is spent;
//! * none eligible ([`KeySelection::Exhausted`]): backpressure, the caller
//!   persists the cursor and ends the pass.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::debug;

use crate::entities::{api_credentials, prelude::ApiCredentials};
use crate::models::credential::ApiCredential;
use crate::services::clock::SharedClock;
use crate::services::storage::StoreError;

/// Default idle time before a key may be reused
pub const DEFAULT_KEY_COOLDOWN_SECS: i64 = 60;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Every credential, ordered by primary key
    async fn list_credentials(&self) -> Result<Vec<ApiCredential>, StoreError>;

    async fn touch(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Increment the failure counter and touch the key
    async fn record_failure(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, job_name: &str) -> Result<i64, StoreError>;

    async fn save_cursor(&self, job_name: &str, index: i64) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    Spare(ApiCredential),
    Last(ApiCredential),
    Exhausted,
}

impl KeySelection {
    /// Choose from the eligible keys; `turn` rotates among spare keys
    pub fn choose(mut eligible: Vec<ApiCredential>, turn: usize) -> Self {
        match eligible.len() {
            0 => KeySelection::Exhausted,
            1 => KeySelection::Last(eligible.remove(0)),
            n => KeySelection::Spare(eligible.swap_remove(turn % n)),
        }
    }
}

pub struct KeyPool {
    credentials: Arc<dyn CredentialStore>,
    cursors: Arc<dyn CursorStore>,
    clock: SharedClock,
    cooldown: Duration,
    job_name: String,
}

impl KeyPool {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        cursors: Arc<dyn CursorStore>,
        clock: SharedClock,
        cooldown: Duration,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            cursors,
            clock,
            cooldown,
            job_name: job_name.into(),
        }
    }

    /// Keys never used, or idle for longer than the cooldown, in primary key order
    pub async fn eligible_keys(&self) -> Result<Vec<ApiCredential>, StoreError> {
        let now = self.clock.now();
        let keys = self.credentials.list_credentials().await?;
        Ok(keys
            .into_iter()
            .filter(|key| match key.last_used {
                None => true,
                Some(last) => now - last > self.cooldown,
            })
            .collect())
    }

    pub async fn select(&self, turn: usize) -> Result<KeySelection, StoreError> {
        let eligible = self.eligible_keys().await?;
        debug!(eligible = eligible.len(), "Selecting API key");
        Ok(KeySelection::choose(eligible, turn))
    }

    pub async fn mark_used(&self, key: &str) -> Result<(), StoreError> {
        self.credentials.touch(key, self.clock.now()).await
    }

    pub async fn record_failure(&self, key: &str) -> Result<(), StoreError> {
        self.credentials.record_failure(key, self.clock.now()).await
    }

    pub async fn get_cursor(&self) -> Result<i64, StoreError> {
        self.cursors.load_cursor(&self.job_name).await
    }

    pub async fn set_cursor(&self, index: i64) -> Result<(), StoreError> {
        self.cursors.save_cursor(&self.job_name, index).await
    }
}

pub struct SeaOrmCredentialStore {
    db: DatabaseConnection,
}

impl SeaOrmCredentialStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find(&self, key: &str) -> Result<Option<api_credentials::Model>, StoreError> {
        Ok(ApiCredentials::find()
            .filter(api_credentials::Column::Key.eq(key))
            .one(&self.db)
            .await?)
    }
}

#[async_trait]
impl CredentialStore for SeaOrmCredentialStore {
    async fn list_credentials(&self) -> Result<Vec<ApiCredential>, StoreError> {
        let rows = ApiCredentials::find()
            .order_by_asc(api_credentials::Column::Id)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ApiCredential {
                id: row.id,
                key: row.key,
                last_used: row.last_used.map(|at| at.and_utc()),
                fail_count: row.fail_count,
            })
            .collect())
    }

    async fn touch(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Some(row) = self.find(key).await? else {
            return Err(StoreError::Other(format!("Unknown API key {}", mask_key(key))));
        };

        let mut active: api_credentials::ActiveModel = row.into();
        active.last_used = Set(Some(at.naive_utc()));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn record_failure(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Some(row) = self.find(key).await? else {
            return Err(StoreError::Other(format!("Unknown API key {}", mask_key(key))));
        };

        let fail_count = row.fail_count;
        let mut active: api_credentials::ActiveModel = row.into();
        active.last_used = Set(Some(at.naive_utc()));
        active.fail_count = Set(fail_count + 1);
        active.update(&self.db).await?;
        Ok(())
    }
}

/// Log-safe form of an API key: first four characters only
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}****", prefix)
}
