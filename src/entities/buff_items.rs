//! `SeaORM` Entity for buff_items table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "buff_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub platform_item_id: String,
    #[sea_orm(unique)]
    pub market_hash_name: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub sell_price: Decimal,
    pub sell_count: i32,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub bidding_price: Decimal,
    pub bidding_count: i32,
    pub update_time: i64,
    pub before_time: i64,
    pub before_count: i32,
    pub turn_over: i32,
    #[sea_orm(column_type = "Text")]
    pub link: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
