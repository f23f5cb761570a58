//! Bearer-token gate for the cron-triggered admin endpoints (§6).

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;

pub async fn require_cron_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = header.and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if t == state.cron_secret.as_ref() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
