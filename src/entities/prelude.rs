pub use super::integration_tokens::Entity as IntegrationTokens;
pub use super::order_items::Entity as OrderItems;
pub use super::orders::Entity as Orders;
pub use super::product_catalog::Entity as ProductCatalog;
pub use super::product_metrics_daily::Entity as ProductMetricsDaily;
pub use super::site_configs::Entity as SiteConfigs;
pub use super::site_metrics_daily::Entity as SiteMetricsDaily;
pub use super::sites::Entity as Sites;
