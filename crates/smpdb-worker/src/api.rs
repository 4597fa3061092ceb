//! Local observability endpoint: `/healthz` for liveness probes and
//! `/status` as an on-demand mirror of the pushed monitoring snapshot.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use smpdb_core::{ProcessState, StatusSnapshot};
use smpdb_db::QueueDepth;

#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
    pub state: Arc<ProcessState>,
}

pub fn build_app(api_state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(api_state)
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

async fn healthz(State(api): State<ApiState>) -> impl IntoResponse {
    match smpdb_db::health_check(&api.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                database: "up",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    database: "down",
                }),
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusData {
    snapshot: StatusSnapshot,
    queue: QueueDepth,
}

async fn status(State(api): State<ApiState>) -> Json<StatusData> {
    let queue = match smpdb_db::queue_depth(&api.pool).await {
        Ok(depth) => depth,
        Err(e) => {
            tracing::warn!(error = %e, "queue depth unavailable");
            QueueDepth::default()
        }
    };
    Json(StatusData {
        snapshot: api.state.snapshot(),
        queue,
    })
}
