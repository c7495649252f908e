pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_products;
mod m20261001_000002_create_platform_items;
mod m20261001_000003_create_api_credentials;
mod m20261001_000004_create_sync_status;
mod m20261001_000005_create_price_history;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_products::Migration),
            Box::new(m20261001_000002_create_platform_items::Migration),
            Box::new(m20261001_000003_create_api_credentials::Migration),
            Box::new(m20261001_000004_create_sync_status::Migration),
            Box::new(m20261001_000005_create_price_history::Migration),
        ]
    }
}
