use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::handlers::{error_response, parse_bool_flag};
use crate::models::order::{SyncOrdersRequest, SyncOrdersResponse};
use crate::models::{ApiEnvelope, ErrorResponse};
use crate::services::value_utils::parse_datetime;
use crate::AppState;

const DEFAULT_LIMIT: u64 = 200;

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub site: Option<String>,
    pub site_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u64>,
    pub sync: Option<String>,
    pub force_refresh: Option<String>,
}

/// GET /api/orders: sync the window from the provider (unless `sync=false`)
/// and return the persisted orders in it.
pub async fn sync_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<ApiEnvelope<SyncOrdersResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let site = query
        .site
        .or(query.site_id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "missing required query parameter: site".to_string(),
                    code: "SITE_NOT_FOUND".to_string(),
                }),
            )
        })?;

    let request = SyncOrdersRequest {
        site,
        from: parse_date_param(query.from.as_deref()),
        to: parse_date_param(query.to.as_deref()),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        should_sync: parse_bool_flag(query.sync.as_deref(), true),
        force_refresh: parse_bool_flag(query.force_refresh.as_deref(), false),
    };

    tracing::info!(
        "orders request: site={} sync={} limit={}",
        request.site,
        request.should_sync,
        request.limit
    );

    state
        .orders
        .sync_orders(&state.db, request)
        .await
        .map(|response| Json(ApiEnvelope::new(response)))
        .map_err(error_response)
}

fn parse_date_param(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_datetime)
}
