//! Multi-provider transactional email delivery engine.
//!
//! Components map directly onto the system overview: a secrets [`vault`],
//! [`provider`] adapters for Resend/Brevo/SES, a [`quota`] ledger, an
//! in-process [`rate_limit`] limiter, a circuit-breaker-backed [`health`]
//! tracker, a [`router`] that picks among them, a [`queue`] store, the
//! [`worker`] loop that drives a tick end to end, a [`monitor`] that pings
//! providers and raises alerts, a [`suppression`] list, and the
//! [`enqueue`] entry point producers call.
//!
//! Storage-shaped types live in [`entities`]; wire-level request/response
//! shapes and shared value types (like [`models::Provider`]) live in
//! [`models`].

pub mod entities;
pub mod enqueue;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod provider;
pub mod quota;
pub mod queue;
pub mod rate_limit;
pub mod router;
pub mod suppression;
pub mod vault;
pub mod worker;

pub use enqueue::enqueue;
pub use error::{EngineError, EngineResult};
pub use health::HealthTracker;
pub use models::{
    AlertSeverity, EmailType, EnqueueRequest, EnqueueResponse, HealthAlert, MonitorHealthResult,
    MonitorMode, ProcessQueueResult, Provider, ProviderStatusSummary, QueueStatus, TemplateData,
};
pub use monitor::{monitor_health, AlertDeduper};
pub use quota::QuotaLedger;
pub use rate_limit::RateLimiter;
pub use router::Router;
pub use suppression::SuppressionList;
pub use vault::{ProviderCredentials, Vault};
pub use worker::{process_queue, WorkerContext, WORKER_LOCK_NAME};
