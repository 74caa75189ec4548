pub mod order;
pub mod stats;

use serde::Serialize;

/// Success envelope wrapping every handler payload.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error payload returned by every handler: a human-readable message plus a
/// stable machine-readable code.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
