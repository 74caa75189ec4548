pub mod orders;
pub mod stats;

use axum::http::StatusCode;
use axum::Json;

use crate::error::SyncError;
use crate::models::ErrorResponse;

/// Map a sync failure to an HTTP status plus a structured error payload.
pub fn error_response(err: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        SyncError::SiteNotFound { .. } => StatusCode::BAD_REQUEST,
        SyncError::TokenNotFound { .. } | SyncError::TokenRefreshFailed { .. } => {
            StatusCode::UNAUTHORIZED
        }
        SyncError::EndpointFetchFailed { .. }
        | SyncError::ResponseParseFailed { .. }
        | SyncError::Http(_) => StatusCode::BAD_GATEWAY,
        SyncError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!("request failed: {}", err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.kind().to_string(),
        }),
    )
}

/// Loose boolean parsing for query flags: absent means the default, and
/// "false"/"0"/"no" (any case) mean false.
pub fn parse_bool_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        None => default,
        Some(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags_parse_loosely() {
        assert!(parse_bool_flag(None, true));
        assert!(!parse_bool_flag(None, false));
        assert!(!parse_bool_flag(Some("false"), true));
        assert!(!parse_bool_flag(Some("0"), true));
        assert!(!parse_bool_flag(Some("No"), true));
        assert!(parse_bool_flag(Some("true"), false));
        assert!(parse_bool_flag(Some("1"), false));
    }
}
