//! HTTP surface (§6): enqueue, the two cron-triggered admin operations, and
//! a readiness probe layered on top of `axum-helpers::server::health_router`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_helpers::server::health_router;
use email_core::models::{EnqueueRequest, MonitorMode};
use sea_orm::{ConnectionTrait, Statement};
use serde::Deserialize;
use serde_json::json;

use crate::auth::require_cron_secret;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/v1/queue/process", post(process_queue))
        .route("/v1/health/monitor", post(monitor_health))
        .route_layer(from_fn_with_state(state.clone(), require_cron_secret));

    Router::new()
        .route("/v1/emails", post(enqueue))
        .route("/ready", get(ready))
        .route("/metrics", get(observability::metrics_handler))
        .merge(admin)
        .merge(health_router(state.app_info))
        .with_state(state)
}

async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Response, email_core::EngineError> {
    let response = email_core::enqueue(&state.db, &request).await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn process_queue(State(state): State<AppState>) -> Response {
    let result = email_core::process_queue(&state.db, &state.worker).await;
    Json(result).into_response()
}

/// Defaults to `Full` so the plain cron-triggered call (no query string)
/// keeps its existing behavior; `?mode=detailed` is how the daily cleanup
/// sweep is meant to be reached, cron-scheduled separately from the rest.
#[derive(Deserialize)]
struct MonitorQuery {
    mode: Option<MonitorMode>,
}

async fn monitor_health(State(state): State<AppState>, Query(query): Query<MonitorQuery>) -> Response {
    let mode = query.mode.unwrap_or(MonitorMode::Full);
    let result = email_core::monitor_health(&state.db, &state.worker, &state.dedup, mode).await;
    Json(result).into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    match state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1",
        ))
        .await
    {
        Ok(_) => (StatusCode::OK, Json(json!({ "ready": true }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}
