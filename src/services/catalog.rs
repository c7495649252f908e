use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};

use crate::entities::{prelude::Products, products};
use crate::services::storage::StoreError;

/// Source of the known product identifiers
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// All market hash names in a stable order
    async fn market_hash_names(&self) -> Result<Vec<String>, StoreError>;
}

pub struct SeaOrmProductCatalog {
    db: DatabaseConnection,
}

impl SeaOrmProductCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductCatalog for SeaOrmProductCatalog {
    async fn market_hash_names(&self) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> = Products::find()
            .select_only()
            .column(products::Column::MarketHashName)
            .order_by_asc(products::Column::Id)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(names)
    }
}
