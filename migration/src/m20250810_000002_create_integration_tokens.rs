use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One live credential row per (site_id, provider); refreshes upsert in place
        manager
            .create_table(
                Table::create()
                    .table(IntegrationTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::SiteId)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::Provider)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::AccessToken)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::RefreshToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::Meta)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integration_tokens_site_provider")
                    .table(IntegrationTokens::Table)
                    .col(IntegrationTokens::SiteId)
                    .col(IntegrationTokens::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IntegrationTokens::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IntegrationTokens {
    Table,
    Id,
    SiteId,
    Provider,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    Meta,
    UpdatedAt,
}
