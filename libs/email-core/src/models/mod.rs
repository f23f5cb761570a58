//! Wire-level request/response shapes and the small value types shared
//! across components. Storage-shaped data lives in [`crate::entities`];
//! this module is what the HTTP surface and component APIs pass around.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::entities::email_queue::{EmailType, QueueStatus, TemplateData};

/// The three supported transactional email providers. Fixed set, not an
/// open-ended plugin registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Resend,
    Brevo,
    Ses,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Resend, Provider::Brevo, Provider::Ses];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Resend => "resend",
            Provider::Brevo => "brevo",
            Provider::Ses => "ses",
        }
    }

    /// Default daily send limit, used when no `ProviderQuotaRow` exists yet.
    pub fn default_daily_limit(&self) -> i32 {
        match self {
            Provider::Resend => 100,
            Provider::Brevo => 300,
            Provider::Ses => 100,
        }
    }

    /// Routing priority order for a given email type (§4.6).
    pub fn priority_for(email_type: &EmailType) -> &'static [Provider] {
        match email_type {
            EmailType::Auth => &[Provider::Resend, Provider::Brevo, Provider::Ses],
            _ => &[Provider::Brevo, Provider::Ses, Provider::Resend],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resend" => Ok(Provider::Resend),
            "brevo" => Ok(Provider::Brevo),
            "ses" => Ok(Provider::Ses),
            other => Err(crate::error::EngineError::Internal(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Request body for the enqueue surface (§4.11).
#[derive(Clone, Debug, Deserialize)]
pub struct EnqueueRequest {
    pub recipient_email: String,
    pub email_type: EmailType,
    pub template_data: TemplateData,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub dedup_key: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: Uuid,
    pub status: QueueStatus,
}

/// Result of a single `ProcessQueue` tick (§6).
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessQueueResult {
    pub skipped: bool,
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub rate_limited: u32,
    pub moved_to_dlq: u32,
    pub duration_ms: u64,
}

/// Depth of a `MonitorHealth` run.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Ping every provider only.
    Ping,
    /// Ping, refresh SES live quota, snapshot history.
    Full,
    /// `Full` plus the 90-day history cleanup sweep.
    Detailed,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProviderStatusSummary {
    pub provider: Provider,
    pub health_score: i32,
    pub circuit_state: String,
    pub success_rate: f64,
    pub total_requests: i64,
    pub average_latency_ms: f64,
    pub emails_sent_today: i32,
    pub daily_limit: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Alert,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthAlert {
    pub provider: Provider,
    pub severity: AlertSeverity,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MonitorHealthResult {
    pub statuses: Vec<ProviderStatusSummary>,
    pub alerts: Vec<HealthAlert>,
    pub snapshots_taken: u32,
    pub cleanup_performed: bool,
    pub duration_ms: u64,
}
