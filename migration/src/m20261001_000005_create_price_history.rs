use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::MarketHashName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PriceHistory::Platform).string_len(16).not_null())
                    .col(
                        ColumnDef::new(PriceHistory::SellPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PriceHistory::SellCount).integer().not_null())
                    .col(ColumnDef::new(PriceHistory::RecordDate).date().not_null())
                    .to_owned(),
            )
            .await?;

        // Makes the daily snapshot insert idempotent per product
        manager
            .create_index(
                Index::create()
                    .name("uq_price_history_name_platform_date")
                    .table(PriceHistory::Table)
                    .col(PriceHistory::MarketHashName)
                    .col(PriceHistory::Platform)
                    .col(PriceHistory::RecordDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_price_history_record_date")
                    .table(PriceHistory::Table)
                    .col(PriceHistory::RecordDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceHistory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PriceHistory {
    Table,
    Id,
    MarketHashName,
    Platform,
    SellPrice,
    SellCount,
    RecordDate,
}
