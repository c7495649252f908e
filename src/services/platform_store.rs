//! Per-platform tables of current prices.
//!
//! The four platform tables share one layout, so the sea-orm access code is
//! generated once per table by `platform_table!` and dispatched on
//! [`Platform`].

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;

use crate::models::platform::{Platform, PlatformRecord};
use crate::services::storage::StoreError;

/// Rows per INSERT statement (13 bind parameters each)
const UPSERT_CHUNK: usize = 500;

#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Current records for the given names, keyed by market hash name
    async fn load(
        &self,
        platform: Platform,
        names: &[String],
    ) -> Result<HashMap<String, PlatformRecord>, StoreError>;

    async fn load_all(&self, platform: Platform) -> Result<Vec<PlatformRecord>, StoreError>;

    /// Insert or fully overwrite records keyed by market hash name
    async fn upsert(&self, platform: Platform, records: &[PlatformRecord]) -> Result<(), StoreError>;
}

macro_rules! platform_table {
    ($table:ident) => {
        mod $table {
            use sea_orm::sea_query::OnConflict;
            use sea_orm::{ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};

            use crate::entities::$table::{ActiveModel, Column, Entity, Model};
            use crate::models::platform::PlatformRecord;

            fn into_record(model: Model) -> PlatformRecord {
                PlatformRecord {
                    platform_item_id: model.platform_item_id,
                    market_hash_name: model.market_hash_name,
                    sell_price: model.sell_price,
                    sell_count: model.sell_count,
                    bidding_price: model.bidding_price,
                    bidding_count: model.bidding_count,
                    update_time: model.update_time,
                    before_time: model.before_time,
                    before_count: model.before_count,
                    turn_over: model.turn_over,
                    link: model.link,
                }
            }

            fn into_active(record: &PlatformRecord) -> ActiveModel {
                ActiveModel {
                    id: NotSet,
                    platform_item_id: Set(record.platform_item_id.clone()),
                    market_hash_name: Set(record.market_hash_name.clone()),
                    sell_price: Set(record.sell_price),
                    sell_count: Set(record.sell_count),
                    bidding_price: Set(record.bidding_price),
                    bidding_count: Set(record.bidding_count),
                    update_time: Set(record.update_time),
                    before_time: Set(record.before_time),
                    before_count: Set(record.before_count),
                    turn_over: Set(record.turn_over),
                    link: Set(record.link.clone()),
                }
            }

            pub async fn load<C: ConnectionTrait>(
                db: &C,
                names: &[String],
            ) -> Result<Vec<PlatformRecord>, DbErr> {
                let rows = Entity::find()
                    .filter(Column::MarketHashName.is_in(names.iter().cloned()))
                    .all(db)
                    .await?;
                Ok(rows.into_iter().map(into_record).collect())
            }

            pub async fn load_all<C: ConnectionTrait>(db: &C) -> Result<Vec<PlatformRecord>, DbErr> {
                let rows = Entity::find().order_by_asc(Column::Id).all(db).await?;
                Ok(rows.into_iter().map(into_record).collect())
            }

            pub async fn upsert<C: ConnectionTrait>(
                db: &C,
                records: &[PlatformRecord],
            ) -> Result<(), DbErr> {
                for chunk in records.chunks(super::UPSERT_CHUNK) {
                    Entity::insert_many(chunk.iter().map(into_active))
                        .on_conflict(
                            OnConflict::column(Column::MarketHashName)
                                .update_columns([
                                    Column::PlatformItemId,
                                    Column::SellPrice,
                                    Column::SellCount,
                                    Column::BiddingPrice,
                                    Column::BiddingCount,
                                    Column::UpdateTime,
                                    Column::BeforeTime,
                                    Column::BeforeCount,
                                    Column::TurnOver,
                                    Column::Link,
                                ])
                                .to_owned(),
                        )
                        .exec_without_returning(db)
                        .await?;
                }
                Ok(())
            }
        }
    };
}

platform_table!(youpin_items);
platform_table!(buff_items);
platform_table!(c5_items);
platform_table!(steam_items);

pub struct SeaOrmPlatformStore {
    db: DatabaseConnection,
}

impl SeaOrmPlatformStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlatformStore for SeaOrmPlatformStore {
    async fn load(
        &self,
        platform: Platform,
        names: &[String],
    ) -> Result<HashMap<String, PlatformRecord>, StoreError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = match platform {
            Platform::Youpin => youpin_items::load(&self.db, names).await?,
            Platform::Buff => buff_items::load(&self.db, names).await?,
            Platform::C5 => c5_items::load(&self.db, names).await?,
            Platform::Steam => steam_items::load(&self.db, names).await?,
        };

        Ok(rows
            .into_iter()
            .map(|record| (record.market_hash_name.clone(), record))
            .collect())
    }

    async fn load_all(&self, platform: Platform) -> Result<Vec<PlatformRecord>, StoreError> {
        let rows = match platform {
            Platform::Youpin => youpin_items::load_all(&self.db).await?,
            Platform::Buff => buff_items::load_all(&self.db).await?,
            Platform::C5 => c5_items::load_all(&self.db).await?,
            Platform::Steam => steam_items::load_all(&self.db).await?,
        };
        Ok(rows)
    }

    async fn upsert(&self, platform: Platform, records: &[PlatformRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        match platform {
            Platform::Youpin => youpin_items::upsert(&self.db, records).await?,
            Platform::Buff => buff_items::upsert(&self.db, records).await?,
            Platform::C5 => c5_items::upsert(&self.db, records).await?,
            Platform::Steam => steam_items::upsert(&self.db, records).await?,
        }
        Ok(())
    }
}
