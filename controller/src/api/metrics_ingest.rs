use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use gpuops_common::{ControllerResponse, MetricsData};
use tracing::warn;

use crate::api::error;
use crate::billing::engine::{self, IngestError};
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", post(ingest))
        .with_state(state)
}

/// `POST /api/metrics` — the agent's sole write path (§6). Every accepted
/// report (and every duplicate no-op) runs through
/// [`engine::process_metrics`] inside one DB transaction; this handler
/// only maps the outcome onto HTTP and updates the `/metrics` counters.
async fn ingest(State(state): State<Arc<AppState>>, Json(data): Json<MetricsData>) -> impl IntoResponse {
    match engine::process_metrics(&state.db, &state.config, data).await {
        Ok(outcome) => {
            if outcome.duplicate {
                state.observability.record_duplicate_report();
            } else {
                state
                    .observability
                    .record_accepted_report(outcome.usage_rows_written);
                state.observability.record_actions(&outcome.actions);
            }
            Json(ControllerResponse {
                actions: outcome.actions,
            })
            .into_response()
        }
        Err(IngestError::BlankNodeId) => error::bad_request("node_id must not be blank"),
        Err(IngestError::BlankReportId) => error::bad_request("report_id must not be blank"),
        Err(IngestError::Internal(e)) => {
            warn!(error = %e, "metrics ingest failed");
            error::api_error(StatusCode::INTERNAL_SERVER_ERROR, "metrics_ingest", e)
        }
    }
}
