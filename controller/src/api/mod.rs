pub mod admin;
pub mod error;
pub mod metrics_ingest;

use std::sync::Arc;

use axum::middleware;
use axum::Router;

use crate::auth::{admin_auth_middleware, agent_token_middleware};
use crate::AppState;

/// Build the full `/api` + `/admin` surface. The agent's ingest endpoint
/// and the admin login handshake sit outside their respective auth
/// middleware; everything else under `/admin` requires it (§6).
pub fn routes(state: Arc<AppState>) -> Router {
    let agent_routes =
        metrics_ingest::routes(state.clone()).layer(middleware::from_fn_with_state(state.clone(), agent_token_middleware));

    let admin_protected =
        admin::protected_routes(state.clone()).layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    let admin_routes = admin::public_routes(state.clone()).merge(admin_protected);

    Router::new()
        .nest("/api", agent_routes)
        .nest("/admin", admin_routes)
}
