use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Unmatched routes get a plain 404 with no body worth scraping.
pub async fn fallback_handler() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}
