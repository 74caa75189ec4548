pub use sea_orm_migration::prelude::*;

mod m20250810_000001_create_site_tables;
mod m20250810_000002_create_integration_tokens;
mod m20250812_000001_create_orders;
mod m20250815_000001_create_product_catalog;
mod m20250818_000001_create_metrics_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250810_000001_create_site_tables::Migration),
            Box::new(m20250810_000002_create_integration_tokens::Migration),
            Box::new(m20250812_000001_create_orders::Migration),
            Box::new(m20250815_000001_create_product_catalog::Migration),
            Box::new(m20250818_000001_create_metrics_tables::Migration),
        ]
    }
}
