use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Max lengths for user-provided string fields.
pub const MAX_NAME: usize = 256;
pub const MAX_NOTE: usize = 4096;

/// Validate that a string field does not exceed the given max length.
/// Returns `Some(Response)` with a 400 error if it does, `None` if OK.
pub fn validate_len(field: &str, value: &str, max: usize) -> Option<Response> {
    if value.len() > max {
        return Some(
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("{field} exceeds maximum length of {max} characters")
                })),
            )
                .into_response(),
        );
    }
    None
}

/// Return a 400 response with the given message, no server-side logging
/// (the caller's own input is the problem, not something to alert on).
pub fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Return a generic 500 response, logging the real error server-side.
pub fn internal_error(context: &str, err: impl std::fmt::Display) -> Response {
    error!(context = context, error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}

/// Return a generic error response at the given status, logging the real error server-side.
pub fn api_error(status: StatusCode, context: &str, err: impl std::fmt::Display) -> Response {
    error!(context = context, error = %err, "API error");
    (
        status,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}
