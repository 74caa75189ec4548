use axum::{routing::get, Router};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::env;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopsync_backend::services::order_sync::OrderSyncService;
use shopsync_backend::services::product_metadata::ProductMetadataService;
use shopsync_backend::services::provider_auth::TokenService;
use shopsync_backend::services::stats_sync::StatsSyncService;
use shopsync_backend::{handlers, AppState, MarketplaceConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shopsync_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let config = MarketplaceConfig {
        platform: env::var("MARKETPLACE_PLATFORM").unwrap_or_else(|_| "marketplace".into()),
        app_key: env::var("MARKETPLACE_APP_KEY").expect("MARKETPLACE_APP_KEY must be set"),
        app_secret: env::var("MARKETPLACE_APP_SECRET").expect("MARKETPLACE_APP_SECRET must be set"),
        auth_host: env::var("MARKETPLACE_AUTH_HOST").expect("MARKETPLACE_AUTH_HOST must be set"),
        api_host: env::var("MARKETPLACE_API_HOST").expect("MARKETPLACE_API_HOST must be set"),
    };

    let http = reqwest::Client::new();
    let tokens = TokenService::new(http.clone(), config.clone());
    let metadata = ProductMetadataService::new();
    let orders = OrderSyncService::new(config.clone(), http.clone(), tokens.clone(), metadata);
    let stats = StatsSyncService::new(config, http, tokens);

    let state = AppState { db, orders, stats };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/orders", get(handlers::orders::sync_orders))
        .route("/api/stats", get(handlers::stats::sync_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "ok"
}
