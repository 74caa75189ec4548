use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SiteMetricsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Site)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Platform)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Channel)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SiteMetricsDaily::StatDate).date().not_null())
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Visitors)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::AddToCart)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Orders)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Payments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Revenue)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SiteMetricsDaily::Currency)
                            .string_len(10)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_site_metrics_daily_site_channel_date")
                    .table(SiteMetricsDaily::Table)
                    .col(SiteMetricsDaily::Site)
                    .col(SiteMetricsDaily::Channel)
                    .col(SiteMetricsDaily::StatDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductMetricsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Site)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Platform)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Sku)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::StatDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::ProductName)
                            .string_len(500)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Visitors)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::AddToCart)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Orders)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Payments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Revenue)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductMetricsDaily::Currency)
                            .string_len(10)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_metrics_daily_site_sku_date")
                    .table(ProductMetricsDaily::Table)
                    .col(ProductMetricsDaily::Site)
                    .col(ProductMetricsDaily::Sku)
                    .col(ProductMetricsDaily::StatDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductMetricsDaily::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SiteMetricsDaily::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SiteMetricsDaily {
    Table,
    Id,
    Site,
    Platform,
    Channel,
    StatDate,
    Impressions,
    Visitors,
    AddToCart,
    Orders,
    Payments,
    Revenue,
    Currency,
}

#[derive(Iden)]
enum ProductMetricsDaily {
    Table,
    Id,
    Site,
    Platform,
    Sku,
    StatDate,
    ProductName,
    Impressions,
    Visitors,
    AddToCart,
    Orders,
    Payments,
    Revenue,
    Currency,
}
