use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Local catalog consulted before the provider product-info API
        manager
            .create_table(
                Table::create()
                    .table(ProductCatalog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductCatalog::Sku)
                            .string_len(100)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductCatalog::Name).string_len(500).null())
                    .col(ColumnDef::new(ProductCatalog::Model).string_len(200).null())
                    .col(
                        ColumnDef::new(ProductCatalog::Image)
                            .string_len(1000)
                            .null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductCatalog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ProductCatalog {
    Table,
    Sku,
    Name,
    Model,
    Image,
}
