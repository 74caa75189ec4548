// src/lib.rs

use sea_orm::DatabaseConnection;
use services::{order_sync::OrderSyncService, stats_sync::StatsSyncService};

/// Provider connection settings, loaded once at startup from the
/// environment.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Provider identifier persisted on every row (e.g. "marketplace").
    pub platform: String,
    pub app_key: String,
    pub app_secret: String,
    /// Host of the OAuth token endpoints.
    pub auth_host: String,
    /// Default seller API host; a site config may override it per site.
    pub api_host: String,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub orders: OrderSyncService,
    pub stats: StatsSyncService,
}

pub mod entities {
    pub mod prelude;
    pub mod integration_tokens;
    pub mod order_items;
    pub mod orders;
    pub mod product_catalog;
    pub mod product_metrics_daily;
    pub mod site_configs;
    pub mod site_metrics_daily;
    pub mod sites;
}

pub mod services {
    pub mod order_sync;
    pub mod posting_mapper;
    pub mod product_metadata;
    pub mod provider_api;
    pub mod provider_auth;
    pub mod site_resolver;
    pub mod stats_sync;
    pub mod value_utils;
}

pub mod error;
pub mod handlers;
pub mod models;
