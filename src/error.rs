use thiserror::Error;

/// Structured failures surfaced by the sync services.
///
/// Fatal kinds propagate unchanged to the handler boundary; recoverable
/// conditions (optional endpoints, metadata lookups) are degraded in place
/// and never reach here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no {provider} refresh token stored for site '{site_id}'; re-authorize the site")]
    TokenNotFound { site_id: String, provider: String },

    #[error("token refresh failed ({status}): {message}")]
    TokenRefreshFailed {
        status: u16,
        message: String,
        body: Option<String>,
    },

    #[error("site '{input}' not found (tried: {})", .candidates.join(", "))]
    SiteNotFound {
        input: String,
        candidates: Vec<String>,
    },

    #[error("{endpoint} fetch failed: {message}")]
    EndpointFetchFailed {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{endpoint} returned a non-JSON payload: {snippet}")]
    ResponseParseFailed { endpoint: String, snippet: String },

    #[error("persistence failed: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl SyncError {
    /// Stable machine-readable code included in handler error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::TokenNotFound { .. } => "TOKEN_NOT_FOUND",
            SyncError::TokenRefreshFailed { .. } => "TOKEN_REFRESH_FAILED",
            SyncError::SiteNotFound { .. } => "SITE_NOT_FOUND",
            SyncError::EndpointFetchFailed { .. } => "ENDPOINT_FETCH_FAILED",
            SyncError::ResponseParseFailed { .. } => "RESPONSE_PARSE_FAILED",
            SyncError::Persistence(_) => "PERSISTENCE_FAILED",
            SyncError::Http(_) => "ENDPOINT_FETCH_FAILED",
        }
    }
}
