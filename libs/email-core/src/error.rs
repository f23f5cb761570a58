//! Error taxonomy for the email delivery engine.
//!
//! `EngineError` is the outcome type every component step resolves to before
//! the worker loop decides what to do with a queued email: retry with
//! backoff, suppress and move to the dead letter queue, or (for the enqueue
//! path only) surface synchronously to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Top-level error taxonomy, matching the retry/suppress/surface decision
/// the worker loop and enqueue API make for each outcome.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed enqueue request. Not retryable, surfaced synchronously.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Recipient is on the suppression list. Not retryable, surfaced
    /// synchronously from `Enqueue`; never raised mid-worker-tick since
    /// suppressed rows are never claimed for normal delivery.
    #[error("recipient is suppressed: {0}")]
    Suppressed(String),

    /// No adapter could be selected for this email (all providers
    /// unconfigured, circuit-open, quota-exhausted or rate-limited).
    /// Retryable with backoff.
    #[error("no provider available")]
    NoProviderAvailable,

    /// Upstream call failed in a way that is expected to resolve itself:
    /// timeout, network error, 429, or 5xx. Retryable with backoff.
    #[error("transient provider error: {0}")]
    TransientProviderError(String),

    /// Upstream rejected the message in a way retrying cannot fix (4xx
    /// bounce class). Not retryable; triggers suppression and DLQ.
    #[error("permanent provider error: {0}")]
    PermanentProviderError(String),

    /// Circuit breaker for the selected provider is open. Routing treats
    /// this identically to `NoProviderAvailable`.
    #[error("circuit breaker open for provider")]
    BreakerOpen,

    /// Underlying database error, not part of the retry taxonomy but
    /// propagated so the worker can log and isolate the failing row.
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),

    /// Secrets resolution failure (missing/invalid credentials).
    #[error("vault error: {0}")]
    Vault(String),

    /// Internal invariant violation; should not normally occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this outcome should be retried with backoff rather than
    /// treated as permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoProviderAvailable
                | Self::TransientProviderError(_)
                | Self::BreakerOpen
                | Self::Storage(_)
        )
    }

    /// Whether this outcome should suppress the recipient and move the
    /// row straight to the dead letter queue, bypassing the retry budget.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(self, Self::PermanentProviderError(_))
    }
}

/// Maps the taxonomy onto HTTP status codes for the `email-engine` surface
/// (§6): `InvalidArgument` -> 400, `Suppressed` -> 409,
/// `NoProviderAvailable`/`BreakerOpen` -> 503, `TransientProviderError` ->
/// 502, `PermanentProviderError` -> 422, everything else -> 500.
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Suppressed(_) => StatusCode::CONFLICT,
            Self::NoProviderAvailable | Self::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransientProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::PermanentProviderError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) | Self::Vault(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
