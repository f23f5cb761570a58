//! Provider adapters: a fixed, tagged set of transactional email backends,
//! each implementing the same three-operation capability (§4.1).

pub mod brevo;
pub mod resend;
pub mod ses;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::TemplateData;

/// Upstream HTTP calls never wait longer than this (§5).
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a successful `send` call.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider_message_id: String,
}

/// The fixed capability set every adapter exposes.
#[async_trait]
pub trait EmailAdapter: Send + Sync {
    /// Send one message. Errors are already classified into the
    /// transient/permanent taxonomy by the adapter — callers never need to
    /// inspect HTTP status codes themselves.
    async fn send(
        &self,
        recipient_email: &str,
        template_data: &TemplateData,
    ) -> Result<SendOutcome, EngineError>;

    /// Live remaining-quota check. Only SES exposes this meaningfully;
    /// other adapters return `Ok(None)`.
    async fn get_quota_live(&self) -> Result<Option<i32>, EngineError>;

    /// Lightweight reachability probe used by the health monitor.
    async fn ping(&self) -> Result<(), EngineError>;
}

/// Classify an HTTP status code per §4.1: 400/422 are only permanent when
/// `body_snippet` actually carries one of the provider's bounce/invalid-
/// recipient markers (`bounce_markers`) — an unrelated validation error on
/// the same status code is transient, not a reason to suppress the
/// recipient and DLQ the message. 429 and 5xx are always transient.
pub fn classify_status(status: u16, body_snippet: &str, bounce_markers: &[&str]) -> EngineError {
    match status {
        400 | 422 => {
            let lower = body_snippet.to_lowercase();
            if bounce_markers.iter().any(|marker| lower.contains(&marker.to_lowercase())) {
                EngineError::PermanentProviderError(format!("http {status}: {body_snippet}"))
            } else {
                EngineError::TransientProviderError(format!("http {status}: {body_snippet}"))
            }
        }
        429 => EngineError::TransientProviderError(format!("rate limited (429): {body_snippet}")),
        500..=599 => {
            EngineError::TransientProviderError(format!("http {status}: {body_snippet}"))
        }
        other => EngineError::TransientProviderError(format!("http {other}: {body_snippet}")),
    }
}

/// Classify a `reqwest` transport-level failure (timeout, connect refused,
/// DNS) — always transient.
pub fn classify_transport_error(err: &reqwest::Error) -> EngineError {
    EngineError::TransientProviderError(format!("transport error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounce_marker_present_is_permanent() {
        let err = classify_status(422, "invalid_to_address: bad format", &["invalid_to_address"]);
        assert!(matches!(err, EngineError::PermanentProviderError(_)));
    }

    #[test]
    fn unrelated_400_is_transient() {
        let err = classify_status(400, "missing required field: subject", &["invalid_to_address"]);
        assert!(matches!(err, EngineError::TransientProviderError(_)));
    }

    #[test]
    fn rate_limit_is_always_transient() {
        let err = classify_status(429, "slow down", &["invalid_to_address"]);
        assert!(matches!(err, EngineError::TransientProviderError(_)));
    }
}
