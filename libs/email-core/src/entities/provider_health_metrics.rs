use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CircuitState {
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "half_open")]
    HalfOpen,
}

/// One row per provider, keyed directly by provider name (no surrogate id).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_provider_health_metrics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub provider: String,
    pub health_score: i32,
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub consecutive_failures: i32,
    pub average_latency_ms: f64,
    pub circuit_state: CircuitState,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub measurement_window_start: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}
