use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// The four marketplace tables share one layout and differ only in name.
const PLATFORM_TABLES: [&str; 4] = ["youpin_items", "buff_items", "c5_items", "steam_items"];

fn platform_table(name: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(name))
        .if_not_exists()
        .col(
            ColumnDef::new(PlatformItem::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(PlatformItem::PlatformItemId)
                .string_len(64)
                .not_null()
                .default(""),
        )
        .col(
            ColumnDef::new(PlatformItem::MarketHashName)
                .string_len(255)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(PlatformItem::SellPrice)
                .decimal_len(12, 2)
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(PlatformItem::SellCount).integer().not_null().default(0))
        .col(
            ColumnDef::new(PlatformItem::BiddingPrice)
                .decimal_len(12, 2)
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(PlatformItem::BiddingCount).integer().not_null().default(0))
        .col(ColumnDef::new(PlatformItem::UpdateTime).big_integer().not_null().default(0))
        .col(ColumnDef::new(PlatformItem::BeforeTime).big_integer().not_null().default(0))
        .col(ColumnDef::new(PlatformItem::BeforeCount).integer().not_null().default(0))
        .col(ColumnDef::new(PlatformItem::TurnOver).integer().not_null().default(0))
        .col(ColumnDef::new(PlatformItem::Link).text().not_null().default(""))
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in PLATFORM_TABLES {
            manager.create_table(platform_table(name)).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in PLATFORM_TABLES {
            manager
                .drop_table(Table::drop().table(Alias::new(name)).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum PlatformItem {
    Id,
    PlatformItemId,
    MarketHashName,
    SellPrice,
    SellCount,
    BiddingPrice,
    BiddingCount,
    UpdateTime,
    BeforeTime,
    BeforeCount,
    TurnOver,
    Link,
}
