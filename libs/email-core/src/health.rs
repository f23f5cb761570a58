//! C5 — Circuit Breaker / Health Tracker (§4.5).
//!
//! One `resilience::CircuitBreaker` per provider drives the fast, in-process
//! open/half-open/closed decision (`with_breaker`); `record_outcome` then
//! persists the same transition plus the rolling health-score inputs into
//! `email_provider_health_metrics` so other processes (and the Router) can
//! read it, tolerating staleness (§5).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use crate::error::EngineError;
use crate::models::Provider;

const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const OPEN_TIMEOUT_SECS: u64 = 30;
const LAST_ERROR_MAX_LEN: usize = 500;

fn breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: CONSECUTIVE_FAILURE_THRESHOLD,
        success_threshold: 1,
        timeout_secs: OPEN_TIMEOUT_SECS,
        error_rate_threshold: None,
        window_size: 100,
    }
}

pub struct HealthTracker {
    breakers: Mutex<HashMap<Provider, std::sync::Arc<CircuitBreaker>>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        let mut breakers = HashMap::new();
        for provider in Provider::ALL {
            breakers.insert(provider, std::sync::Arc::new(CircuitBreaker::new(breaker_config())));
        }
        Self {
            breakers: Mutex::new(breakers),
        }
    }

    fn breaker(&self, provider: Provider) -> std::sync::Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .expect("breaker map mutex poisoned")
            .get(&provider)
            .expect("every provider has a breaker")
            .clone()
    }

    /// Whether `provider`'s breaker currently admits calls.
    pub fn can_execute(&self, provider: Provider) -> bool {
        self.breaker(provider).can_execute()
    }

    pub fn circuit_state(&self, provider: Provider) -> CircuitState {
        self.breaker(provider).state()
    }

    /// Record the outcome of an attempted send and persist the updated
    /// health row. `latency_ms` is the observed round-trip time.
    pub async fn record_outcome(
        &self,
        db: &DatabaseConnection,
        provider: Provider,
        success: bool,
        latency_ms: i64,
        error: Option<&str>,
    ) -> Result<(), EngineError> {
        let breaker = self.breaker(provider);
        let was_open = matches!(breaker.state(), CircuitState::Open);
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
        if !was_open && matches!(breaker.state(), CircuitState::Open) {
            crate::metrics::record_breaker_tripped(provider);
        }

        self.ensure_row_exists(db, provider).await?;

        let truncated_error = error.map(|e| {
            if e.len() > LAST_ERROR_MAX_LEN {
                e[..LAST_ERROR_MAX_LEN].to_string()
            } else {
                e.to_string()
            }
        });

        let circuit_state = match breaker.state() {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };

        db.execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            r#"UPDATE email_provider_health_metrics
               SET total_requests = total_requests + 1,
                   successful_requests = successful_requests + $1,
                   failed_requests = failed_requests + $2,
                   consecutive_failures = CASE WHEN $3 THEN 0 ELSE consecutive_failures + 1 END,
                   average_latency_ms = average_latency_ms * 0.8 + $4::double precision * 0.2,
                   circuit_state = $5,
                   last_failure_time = CASE WHEN $3 THEN last_failure_time ELSE $6 END,
                   last_error = CASE WHEN $3 THEN last_error ELSE $7 END,
                   health_score = $8,
                   updated_at = now()
               WHERE provider = $9"#,
            [
                (success as i64).into(),
                (!success as i64).into(),
                success.into(),
                (latency_ms as f64).into(),
                circuit_state.into(),
                Utc::now().into(),
                truncated_error.into(),
                self.health_score(db, provider, success, latency_ms, circuit_state)
                    .await?
                    .into(),
                provider.as_str().into(),
            ],
        ))
        .await?;

        Ok(())
    }

    /// Compute the §4.5 health score from the row as it stands *before*
    /// this outcome is written, approximated against the post-update
    /// counters we're about to persist.
    async fn health_score(
        &self,
        db: &DatabaseConnection,
        provider: Provider,
        success: bool,
        latency_ms: i64,
        circuit_state: &str,
    ) -> Result<i32, EngineError> {
        let row = db
            .query_one(Statement::from_sql_and_values(
                db.get_database_backend(),
                "SELECT total_requests, successful_requests, average_latency_ms FROM email_provider_health_metrics WHERE provider = $1",
                [provider.as_str().into()],
            ))
            .await?;

        let (total, successful, avg_latency): (i64, i64, f64) = match row {
            Some(r) => (
                r.try_get("", "total_requests").unwrap_or(0),
                r.try_get("", "successful_requests").unwrap_or(0),
                r.try_get("", "average_latency_ms").unwrap_or(0.0),
            ),
            None => (0, 0, 0.0),
        };

        let new_total = total + 1;
        let new_successful = successful + success as i64;
        let new_avg_latency = avg_latency * 0.8 + latency_ms as f64 * 0.2;

        Ok(compute_health_score(
            new_successful as f64 / new_total.max(1) as f64,
            new_avg_latency,
            circuit_state,
        ))
    }

    async fn ensure_row_exists(
        &self,
        db: &DatabaseConnection,
        provider: Provider,
    ) -> Result<(), EngineError> {
        db.execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            r#"INSERT INTO email_provider_health_metrics
               (provider, health_score, total_requests, successful_requests, failed_requests,
                consecutive_failures, average_latency_ms, circuit_state, measurement_window_start, updated_at)
               VALUES ($1, 100, 0, 0, 0, 0, 0, 'closed', now(), now())
               ON CONFLICT (provider) DO NOTHING"#,
            [provider.as_str().into()],
        ))
        .await?;
        Ok(())
    }
}

/// `score = 100 * success_rate * latency_factor * circuit_factor` (§4.5),
/// clamped to `[0, 100]`.
pub fn compute_health_score(success_rate: f64, avg_latency_ms: f64, circuit_state: &str) -> i32 {
    let latency_factor = if avg_latency_ms <= 500.0 {
        1.0
    } else if avg_latency_ms >= 5000.0 {
        0.2
    } else if avg_latency_ms <= 3000.0 {
        1.0 - 0.5 * (avg_latency_ms - 500.0) / 2500.0
    } else {
        0.5 - 0.3 * (avg_latency_ms - 3000.0) / 2000.0
    };

    let circuit_factor = match circuit_state {
        "closed" => 1.0,
        "half_open" => 0.5,
        _ => 0.1,
    };

    let score = 100.0 * success_rate * latency_factor * circuit_factor;
    score.clamp(0.0, 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_health_scores_at_one_hundred() {
        assert_eq!(compute_health_score(1.0, 100.0, "closed"), 100);
    }

    #[test]
    fn open_circuit_crushes_the_score() {
        let score = compute_health_score(1.0, 100.0, "open");
        assert!(score <= 10);
    }

    #[test]
    fn high_latency_decays_the_score() {
        let at_3s = compute_health_score(1.0, 3000.0, "closed");
        let at_5s = compute_health_score(1.0, 5000.0, "closed");
        assert!(at_5s < at_3s);
        assert_eq!(at_5s, 20);
    }
}
