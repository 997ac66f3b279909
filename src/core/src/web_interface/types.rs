use serde::Serialize;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Body of `GET /api/v1/check`
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub status: &'static str,
}
