use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tower::ServiceExt;

use shopsync_backend::services::order_sync::OrderSyncService;
use shopsync_backend::services::product_metadata::ProductMetadataService;
use shopsync_backend::services::provider_auth::TokenService;
use shopsync_backend::services::stats_sync::StatsSyncService;
use shopsync_backend::{handlers, AppState, MarketplaceConfig};

// Router over a disconnected database: exercises the request-validation
// paths that never reach storage or the provider.
fn build_test_router() -> Router {
    let config = MarketplaceConfig {
        platform: "marketplace".to_string(),
        app_key: "test-key".to_string(),
        app_secret: "test-secret".to_string(),
        auth_host: "http://localhost:9".to_string(),
        api_host: "http://localhost:9".to_string(),
    };
    let http = reqwest::Client::new();
    let tokens = TokenService::new(http.clone(), config.clone());
    let metadata = ProductMetadataService::new();
    let orders = OrderSyncService::new(config.clone(), http.clone(), tokens.clone(), metadata);
    let stats = StatsSyncService::new(config, http, tokens);

    let state = AppState {
        db: DatabaseConnection::Disconnected,
        orders,
        stats,
    };

    Router::new()
        .route("/api/orders", get(handlers::orders::sync_orders))
        .route("/api/stats", get(handlers::stats::sync_stats))
        .with_state(state)
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn orders_without_site_is_rejected() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/orders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response.into_body()).await;
    assert_eq!(payload["code"], "SITE_NOT_FOUND");
    assert!(payload["error"].as_str().unwrap().contains("site"));
}

#[tokio::test]
async fn orders_with_blank_site_is_rejected() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/orders?site=%20%20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_without_site_is_rejected() {
    let app = build_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response.into_body()).await;
    assert_eq!(payload["code"], "SITE_NOT_FOUND");
}
