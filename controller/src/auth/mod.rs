pub mod bootstrap;
pub mod sessions;
pub mod tokens;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::AppState;

/// Authenticated admin identity, attached to the request by
/// [`admin_auth_middleware`] and consumed via `Extension<AdminAuth>`.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub admin_user_id: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Middleware guarding `POST /api/metrics`: the agent presents its shared
/// secret via `X-Agent-Token` (§6 "auth model"). Compared in constant time
/// so a wrong guess can't be narrowed down by response timing.
pub async fn agent_token_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get("x-agent-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !tokens::check_agent_token(&state.config, token) {
        return Err(unauthorized("Invalid or missing agent token"));
    }

    Ok(next.run(req).await)
}

/// Middleware guarding `/admin/*`: either a bearer admin token, or a valid
/// session cookie with a matching `X-CSRF-Token` header on every verb
/// other than GET (§6 "auth model").
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Some(token) = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if tokens::check_admin_token(&state.config, token) {
            req.extensions_mut().insert(AdminAuth {
                admin_user_id: "bearer-token".to_string(),
            });
            return Ok(next.run(req).await);
        }
    }

    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let session_token = cookie_header.split(';').find_map(|c| {
        let c = c.trim();
        c.strip_prefix(&format!("{}=", sessions::cookie_name()))
    });

    let Some(session_token) = session_token else {
        return Err(unauthorized("Authentication required"));
    };

    let session = sessions::validate_session(&state.db, session_token)
        .await
        .map_err(|_| unauthorized("Invalid or expired session"))?;

    if req.method() != Method::GET {
        let csrf_header = req
            .headers()
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if csrf_header.is_empty() || csrf_header != session.csrf_token {
            return Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Missing or invalid CSRF token" })),
            )
                .into_response());
        }
    }

    req.extensions_mut().insert(AdminAuth {
        admin_user_id: session.admin_user_id,
    });

    Ok(next.run(req).await)
}
