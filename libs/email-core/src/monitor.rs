//! C9 — Health Monitor (§4.9): pings every provider, refreshes whichever
//! providers expose a live quota check (SES, Brevo), snapshots a history
//! row per provider, raises deduplicated alerts, and (at `Detailed` depth)
//! sweeps history older than 90 days.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use uuid::Uuid;

use crate::health::HealthTracker;
use crate::models::{AlertSeverity, HealthAlert, MonitorHealthResult, MonitorMode, Provider, ProviderStatusSummary};
use crate::provider::EmailAdapter;
use crate::quota::QuotaLedger;
use crate::worker::WorkerContext;

const ALERT_COOLDOWN: Duration = Duration::from_secs(3600);
const HISTORY_RETENTION_DAYS: i64 = 90;
const CLEANUP_BATCH_LIMIT: u64 = 1000;

/// In-process dedup of (provider, alert kind) so a flapping provider
/// doesn't spam an alert every tick. Cold-start resets this, which is
/// acceptable (§9).
#[derive(Default)]
pub struct AlertDeduper {
    last_emitted: Mutex<HashMap<(Provider, &'static str), Instant>>,
}

impl AlertDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    fn should_emit(&self, provider: Provider, kind: &'static str) -> bool {
        let mut map = self.last_emitted.lock().expect("alert dedup mutex poisoned");
        let now = Instant::now();
        match map.get(&(provider, kind)) {
            Some(last) if now.duration_since(*last) < ALERT_COOLDOWN => false,
            _ => {
                map.insert((provider, kind), now);
                true
            }
        }
    }
}

pub async fn monitor_health(
    db: &DatabaseConnection,
    ctx: &WorkerContext,
    dedup: &AlertDeduper,
    mode: MonitorMode,
) -> MonitorHealthResult {
    let started = Instant::now();
    let mut result = MonitorHealthResult::default();

    for provider in Provider::ALL {
        let adapter = match provider {
            Provider::Resend => &ctx.resend,
            Provider::Brevo => &ctx.brevo,
            Provider::Ses => &ctx.ses,
        };

        ping_provider(db, &ctx.health, provider, adapter.as_ref()).await;

        if mode != MonitorMode::Ping {
            refresh_live_quota(db, provider, adapter.as_ref()).await;
        }

        let summary = build_status_summary(db, provider).await;
        for alert in alerts_for(&summary, dedup) {
            result.alerts.push(alert);
        }

        if mode != MonitorMode::Ping {
            if snapshot_history(db, &summary).await.is_ok() {
                result.snapshots_taken += 1;
            }
        }

        result.statuses.push(summary);
    }

    if mode == MonitorMode::Detailed {
        result.cleanup_performed = cleanup_old_history(db).await.unwrap_or(false);
    }

    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

async fn ping_provider(
    db: &DatabaseConnection,
    health: &HealthTracker,
    provider: Provider,
    adapter: &dyn EmailAdapter,
) {
    let started = Instant::now();
    let outcome = adapter.ping().await;
    let latency_ms = started.elapsed().as_millis() as i64;

    let _ = match outcome {
        Ok(()) => health.record_outcome(db, provider, true, latency_ms, None).await,
        Err(e) => {
            health
                .record_outcome(db, provider, false, latency_ms, Some(&e.to_string()))
                .await
        }
    };
}

async fn refresh_live_quota(db: &DatabaseConnection, provider: Provider, adapter: &dyn EmailAdapter) {
    if let Ok(Some(live_limit)) = adapter.get_quota_live().await {
        let quota = QuotaLedger::new(db);
        let _ = quota.update_daily_limit(provider, live_limit).await;
    }
}

async fn build_status_summary(db: &DatabaseConnection, provider: Provider) -> ProviderStatusSummary {
    let health_row = db
        .query_one(Statement::from_sql_and_values(
            db.get_database_backend(),
            "SELECT health_score, circuit_state, total_requests, successful_requests, average_latency_ms FROM email_provider_health_metrics WHERE provider = $1",
            [provider.as_str().into()],
        ))
        .await
        .ok()
        .flatten();

    let (health_score, circuit_state, success_rate, total_requests, average_latency_ms) = match health_row {
        Some(row) => {
            let total: i64 = row.try_get("", "total_requests").unwrap_or(0);
            let successful: i64 = row.try_get("", "successful_requests").unwrap_or(0);
            (
                row.try_get("", "health_score").unwrap_or(100),
                row.try_get("", "circuit_state").unwrap_or_else(|_| "closed".to_string()),
                if total == 0 { 1.0 } else { successful as f64 / total as f64 },
                total,
                row.try_get("", "average_latency_ms").unwrap_or(0.0),
            )
        }
        None => (100, "closed".to_string(), 1.0, 0, 0.0),
    };

    let quota = QuotaLedger::new(db);
    let snapshot = quota.snapshot(provider).await.ok();

    ProviderStatusSummary {
        provider,
        health_score,
        circuit_state,
        success_rate,
        total_requests,
        average_latency_ms,
        emails_sent_today: snapshot.as_ref().map(|s| s.emails_sent).unwrap_or(0),
        daily_limit: snapshot
            .map(|s| s.daily_limit)
            .unwrap_or_else(|| provider.default_daily_limit()),
    }
}

/// Alert thresholds (§4.9): CRITICAL at health <= 30, WARNING at <= 50 or
/// (total > 10 and success rate < 70%) or average latency > 2s, ALERT when
/// the circuit is open.
fn alerts_for(summary: &ProviderStatusSummary, dedup: &AlertDeduper) -> Vec<HealthAlert> {
    let mut alerts = Vec::new();

    if summary.circuit_state == "open" && dedup.should_emit(summary.provider, "circuit_open") {
        alerts.push(HealthAlert {
            provider: summary.provider,
            severity: AlertSeverity::Alert,
            message: format!("{} circuit breaker is open", summary.provider),
        });
    }

    if summary.health_score <= 30 && dedup.should_emit(summary.provider, "critical_health") {
        alerts.push(HealthAlert {
            provider: summary.provider,
            severity: AlertSeverity::Critical,
            message: format!("{} health score at {}", summary.provider, summary.health_score),
        });
    } else if (summary.health_score <= 50
        || summary.average_latency_ms > 2000.0
        || (summary.total_requests > 10 && summary.success_rate < 0.70))
        && dedup.should_emit(summary.provider, "degraded_health")
    {
        alerts.push(HealthAlert {
            provider: summary.provider,
            severity: AlertSeverity::Warning,
            message: format!(
                "{} degraded: health={} avg_latency_ms={:.0}",
                summary.provider, summary.health_score, summary.average_latency_ms
            ),
        });
    }

    alerts
}

async fn snapshot_history(
    db: &DatabaseConnection,
    summary: &ProviderStatusSummary,
) -> Result<(), sea_orm::DbErr> {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        r#"INSERT INTO email_provider_health_history
           (id, provider, snapshot_at, health_score, success_rate, avg_latency_ms, total_requests)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        [
            Uuid::new_v4().into(),
            summary.provider.as_str().into(),
            Utc::now().into(),
            summary.health_score.into(),
            summary.success_rate.into(),
            summary.average_latency_ms.into(),
            summary.total_requests.into(),
        ],
    ))
    .await?;

    Ok(())
}

/// Delete history rows older than 90 days, batched to at most 1000 rows
/// per run (§4.9). Callers schedule this daily around 02:00 UTC.
async fn cleanup_old_history(db: &DatabaseConnection) -> Result<bool, sea_orm::DbErr> {
    let cutoff = Utc::now() - chrono::Duration::days(HISTORY_RETENTION_DAYS);

    let result = db
        .execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            r#"DELETE FROM email_provider_health_history
               WHERE id IN (
                   SELECT id FROM email_provider_health_history
                   WHERE snapshot_at < $1
                   LIMIT $2
               )"#,
            [cutoff.into(), CLEANUP_BATCH_LIMIT.into()],
        ))
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(health_score: i32, success_rate: f64, total_requests: i64, average_latency_ms: f64) -> ProviderStatusSummary {
        ProviderStatusSummary {
            provider: Provider::Resend,
            health_score,
            circuit_state: "closed".to_string(),
            success_rate,
            total_requests,
            average_latency_ms,
            emails_sent_today: 0,
            daily_limit: 1000,
        }
    }

    #[test]
    fn low_success_rate_with_enough_volume_warns() {
        let dedup = AlertDeduper::new();
        let alerts = alerts_for(&summary(65, 0.65, 20, 200.0), &dedup);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn low_success_rate_below_volume_floor_is_silent() {
        let dedup = AlertDeduper::new();
        let alerts = alerts_for(&summary(65, 0.65, 5, 200.0), &dedup);
        assert!(alerts.is_empty());
    }

    #[test]
    fn healthy_provider_is_silent() {
        let dedup = AlertDeduper::new();
        let alerts = alerts_for(&summary(95, 0.99, 500, 150.0), &dedup);
        assert!(alerts.is_empty());
    }
}
