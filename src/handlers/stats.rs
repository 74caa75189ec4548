use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::handlers::{error_response, parse_bool_flag};
use crate::models::stats::{SyncStatsRequest, SyncStatsResponse};
use crate::models::{ApiEnvelope, ErrorResponse};
use crate::services::value_utils::parse_datetime;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub site: Option<String>,
    pub site_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sync: Option<String>,
    pub force_refresh: Option<String>,
}

/// GET /api/stats: sync daily site and per-product metrics for the window
/// and return the persisted rows.
pub async fn sync_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiEnvelope<SyncStatsResponse>>, (StatusCode, Json<ErrorResponse>)> {
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

    let request = SyncStatsRequest {
        site,
        from: query.from.as_deref().and_then(parse_datetime),
        to: query.to.as_deref().and_then(parse_datetime),
        should_sync: parse_bool_flag(query.sync.as_deref(), true),
        force_refresh: parse_bool_flag(query.force_refresh.as_deref(), false),
    };

    tracing::info!("stats request: site={} sync={}", request.site, request.should_sync);

    state
        .stats
        .sync_stats(&state.db, request)
        .await
        .map(|response| Json(ApiEnvelope::new(response)))
        .map_err(error_response)
}
