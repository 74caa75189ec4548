use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // site_configs drives alias resolution and API host overrides
        manager
            .create_table(
                Table::create()
                    .table(SiteConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SiteConfigs::Id)
                            .string_len(100)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SiteConfigs::Name).string_len(200).null())
                    .col(
                        ColumnDef::new(SiteConfigs::DisplayName)
                            .string_len(200)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SiteConfigs::Platform)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SiteConfigs::Domain).string_len(200).null())
                    .col(ColumnDef::new(SiteConfigs::ApiHost).string_len(200).null())
                    .col(
                        ColumnDef::new(SiteConfigs::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sites::Id)
                            .string_len(100)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sites::Name).string_len(200).null())
                    .col(ColumnDef::new(Sites::DisplayName).string_len(200).null())
                    .col(ColumnDef::new(Sites::Platform).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Sites::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SiteConfigs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SiteConfigs {
    Table,
    Id,
    Name,
    DisplayName,
    Platform,
    Domain,
    ApiHost,
    IsActive,
}

#[derive(Iden)]
enum Sites {
    Table,
    Id,
    Name,
    DisplayName,
    Platform,
    IsActive,
}
