use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // orders are keyed by the provider-global order_no natural key
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Orders::OrderNo)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::SiteId).string_len(100).not_null())
                    .col(ColumnDef::new(Orders::Platform).string_len(50).not_null())
                    .col(ColumnDef::new(Orders::Channel).string_len(100).null())
                    .col(ColumnDef::new(Orders::Status).string_len(30).not_null())
                    .col(
                        ColumnDef::new(Orders::SettlementStatus)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::SettlementDate).date().null())
                    .col(
                        ColumnDef::new(Orders::PlacedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::Currency).string_len(10).not_null())
                    .col(
                        ColumnDef::new(Orders::Subtotal)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Discount)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::ShippingFee)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Tax)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Total)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::CostOfGoods)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::LogisticsCost)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::Remark).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_site_placed_at")
                    .table(Orders::Table)
                    .col(Orders::SiteId)
                    .col(Orders::PlacedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderItems::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderItems::OrderId).integer().not_null())
                    .col(ColumnDef::new(OrderItems::Sku).string_len(100).not_null())
                    .col(
                        ColumnDef::new(OrderItems::ProductName)
                            .string_len(500)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderItems::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(OrderItems::UnitPrice)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OrderItems::TotalPrice)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OrderItems::CostPrice)
                            .decimal_len(14, 2)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OrderItems::ProductImage)
                            .string_len(1000)
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_order_id")
                            .from(OrderItems::Table, OrderItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_items_order_id")
                    .table(OrderItems::Table)
                    .col(OrderItems::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Orders {
    Table,
    Id,
    OrderNo,
    SiteId,
    Platform,
    Channel,
    Status,
    SettlementStatus,
    SettlementDate,
    PlacedAt,
    Currency,
    Subtotal,
    Discount,
    ShippingFee,
    Tax,
    Total,
    CostOfGoods,
    LogisticsCost,
    Remark,
}

#[derive(Iden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    Sku,
    ProductName,
    Quantity,
    UnitPrice,
    TotalPrice,
    CostPrice,
    ProductImage,
}
