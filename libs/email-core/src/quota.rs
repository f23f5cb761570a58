//! C3 — Quota Ledger (§4.3): atomic per-(provider, date) send counters.
//!
//! `try_reserve` is a single conditional `UPDATE ... WHERE emails_sent <
//! daily_limit` so concurrent workers never oversell a day's quota; the row
//! is created lazily on first use. A send attempt that fails after
//! reservation keeps its consumed slot (§9 Open Questions) — only a
//! reservation that never reached an attempt, i.e. a circuit-breaker
//! short-circuit, is refunded via `refund`.

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};
use uuid::Uuid;

use crate::entities::provider_quota;
use crate::error::EngineError;
use crate::models::Provider;

pub struct QuotaLedger<'a> {
    db: &'a DatabaseConnection,
}

#[derive(Debug, Clone)]
pub struct QuotaSnapshot {
    pub provider: Provider,
    pub emails_sent: i32,
    pub daily_limit: i32,
}

impl<'a> QuotaLedger<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Atomically reserve one send for `provider` today. Returns `true` if
    /// the reservation succeeded, `false` if today's quota is exhausted.
    pub async fn try_reserve(&self, provider: Provider) -> Result<bool, EngineError> {
        self.ensure_row_exists(provider).await?;

        let today = Utc::now().date_naive();
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_provider_quota
                   SET emails_sent = emails_sent + 1, updated_at = now()
                   WHERE provider = $1 AND date_utc = $2 AND emails_sent < daily_limit"#,
                [provider.as_str().into(), today.into()],
            ))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return a reservation that was never attempted (e.g. the provider's
    /// circuit breaker opened between `try_reserve` and send). Floors at 0.
    pub async fn refund(&self, provider: Provider) -> Result<(), EngineError> {
        let today = Utc::now().date_naive();
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_provider_quota
                   SET emails_sent = GREATEST(emails_sent - 1, 0), updated_at = now()
                   WHERE provider = $1 AND date_utc = $2"#,
                [provider.as_str().into(), today.into()],
            ))
            .await?;
        Ok(())
    }

    /// Point-in-time view of today's usage for `provider`.
    pub async fn snapshot(&self, provider: Provider) -> Result<QuotaSnapshot, EngineError> {
        self.ensure_row_exists(provider).await?;

        let today = Utc::now().date_naive();
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT emails_sent, daily_limit FROM email_provider_quota WHERE provider = $1 AND date_utc = $2",
                [provider.as_str().into(), today.into()],
            ))
            .await?
            .ok_or_else(|| EngineError::Internal("quota row vanished after upsert".into()))?;

        Ok(QuotaSnapshot {
            provider,
            emails_sent: row.try_get("", "emails_sent").map_err(DbErr::from)?,
            daily_limit: row.try_get("", "daily_limit").map_err(DbErr::from)?,
        })
    }

    /// Update today's daily limit when a live quota check (SES) disagrees
    /// with the stored value.
    pub async fn update_daily_limit(
        &self,
        provider: Provider,
        daily_limit: i32,
    ) -> Result<(), EngineError> {
        self.ensure_row_exists(provider).await?;

        let today = Utc::now().date_naive();
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_provider_quota SET daily_limit = $1, updated_at = now()
                   WHERE provider = $2 AND date_utc = $3 AND daily_limit != $1"#,
                [daily_limit.into(), provider.as_str().into(), today.into()],
            ))
            .await?;
        Ok(())
    }

    /// Lazily create today's row if it doesn't exist yet. A new UTC day
    /// implicitly resets usage since rows are keyed by `(provider, date)`.
    async fn ensure_row_exists(&self, provider: Provider) -> Result<(), EngineError> {
        let today = Utc::now().date_naive();
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_provider_quota (id, provider, date_utc, emails_sent, daily_limit, created_at, updated_at)
                   VALUES ($1, $2, $3, 0, $4, now(), now())
                   ON CONFLICT (provider, date_utc) DO NOTHING"#,
                [
                    Uuid::new_v4().into(),
                    provider.as_str().into(),
                    today.into(),
                    provider.default_daily_limit().into(),
                ],
            ))
            .await?;
        Ok(())
    }
}

impl From<provider_quota::Model> for QuotaSnapshot {
    fn from(row: provider_quota::Model) -> Self {
        Self {
            provider: row.provider.parse().unwrap_or(Provider::Resend),
            emails_sent: row.emails_sent,
            daily_limit: row.daily_limit,
        }
    }
}
