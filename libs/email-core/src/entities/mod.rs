//! SeaORM entities for the seven contractual tables plus the worker's
//! distributed lock row. Column names mirror the migration in
//! `migration::m20260101_000000_create_email_engine_tables` exactly.

pub mod dead_letter_queue;
pub mod email_logs;
pub mod email_queue;
pub mod provider_health_history;
pub mod provider_health_metrics;
pub mod provider_quota;
pub mod queue_lock;
pub mod suppression;
