//! C7 — Queue Store (§4.7): the `email_queue` table plus its satellite
//! tables (`email_logs`, `email_dead_letter_queue`) and the single-writer
//! `email_queue_lock` the worker loop uses for distributed coordination.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use uuid::Uuid;

use crate::entities::email_queue::{EmailType, QueueStatus, TemplateData};
use crate::error::EngineError;
use crate::models::EnqueueRequest;

/// Claimed rows get this long to complete before `reap_stuck` considers
/// them abandoned (§4.8).
const CLAIM_TTL: ChronoDuration = ChronoDuration::minutes(2);

const BACKOFF_BASE_SECS: i64 = 60;
const BACKOFF_MAX_SECS: i64 = 3600;

/// `backoff(k) = min(base * 2^k + jitter, max)`, `jitter ∈ [0, base)` (§4.7).
pub fn backoff_for_attempt(attempt: u32) -> ChronoDuration {
    let exp = BACKOFF_BASE_SECS.saturating_mul(1i64 << attempt.min(20));
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_BASE_SECS);
    let total = (exp.saturating_add(jitter)).min(BACKOFF_MAX_SECS);
    ChronoDuration::seconds(total)
}

#[derive(Debug, Clone)]
pub struct ClaimedEmail {
    pub id: Uuid,
    pub recipient_email: String,
    pub email_type: EmailType,
    pub template_data: TemplateData,
    pub attempts: i32,
    pub max_attempts: i32,
    pub claim_token: Uuid,
}

pub struct QueueStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> QueueStore<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new row, or return the existing id if `dedup_key` matches a
    /// non-terminal row already queued (§4.11, §8 idempotence invariant).
    pub async fn enqueue(
        &self,
        request: &EnqueueRequest,
    ) -> Result<(Uuid, QueueStatus), EngineError> {
        if let Some(dedup_key) = &request.dedup_key {
            let row = self
                .db
                .query_one(Statement::from_sql_and_values(
                    self.db.get_database_backend(),
                    r#"SELECT id, status FROM email_queue
                       WHERE dedup_key = $1 AND status NOT IN ('completed', 'dead')
                       ORDER BY created_at DESC LIMIT 1"#,
                    [dedup_key.clone().into()],
                ))
                .await?;

            if let Some(row) = row {
                let id: Uuid = row.try_get("", "id")?;
                let status: String = row.try_get("", "status")?;
                return Ok((id, parse_status(&status)));
            }
        }

        let id = Uuid::new_v4();
        let max_attempts = request.max_attempts.unwrap_or(5);
        let next_retry_at = request.scheduled_at.unwrap_or_else(Utc::now);
        let template_data_json = serde_json::to_value(&request.template_data)
            .map_err(|e| EngineError::InvalidArgument(format!("invalid template_data: {e}")))?;

        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_queue
                   (id, recipient_email, email_type, template_data, attempts, max_attempts,
                    status, next_retry_at, dedup_key, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, 0, $5, 'queued', $6, $7, now(), now())"#,
                [
                    id.into(),
                    request.recipient_email.clone().into(),
                    email_type_str(&request.email_type).into(),
                    template_data_json.into(),
                    max_attempts.into(),
                    next_retry_at.into(),
                    request.dedup_key.clone().into(),
                ],
            ))
            .await?;

        Ok((id, QueueStatus::Queued))
    }

    /// Atomically claim up to `limit` ready rows, ordered `next_retry_at
    /// ASC, created_at ASC`, flipping them to `in_flight` with a fresh claim
    /// token and deadline (§4.7, §8 at-most-once-until-deadline invariant).
    pub async fn claim_ready(&self, limit: u32) -> Result<Vec<ClaimedEmail>, EngineError> {
        let now = Utc::now();
        let deadline = now + CLAIM_TTL;

        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"WITH claimed AS (
                       SELECT id FROM email_queue
                       WHERE status IN ('queued', 'failed_retry') AND next_retry_at <= $1
                       ORDER BY next_retry_at ASC, created_at ASC
                       LIMIT $2
                       FOR UPDATE SKIP LOCKED
                   )
                   UPDATE email_queue
                   SET status = 'in_flight', claim_token = $3, claim_deadline = $4, updated_at = now()
                   FROM claimed
                   WHERE email_queue.id = claimed.id
                   RETURNING email_queue.id, email_queue.recipient_email, email_queue.email_type,
                             email_queue.template_data, email_queue.attempts, email_queue.max_attempts,
                             email_queue.claim_token"#,
                [
                    now.into(),
                    limit.into(),
                    Uuid::new_v4().into(),
                    deadline.into(),
                ],
            ))
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let template_data_json: serde_json::Value = row.try_get("", "template_data")?;
            let template_data = serde_json::from_value(template_data_json)
                .map_err(|e| EngineError::Internal(format!("corrupt template_data: {e}")))?;
            let email_type_raw: String = row.try_get("", "email_type")?;

            claimed.push(ClaimedEmail {
                id: row.try_get("", "id")?,
                recipient_email: row.try_get("", "recipient_email")?,
                email_type: parse_email_type(&email_type_raw),
                template_data,
                attempts: row.try_get("", "attempts")?,
                max_attempts: row.try_get("", "max_attempts")?,
                claim_token: row.try_get("", "claim_token")?,
            });
        }

        Ok(claimed)
    }

    /// Only the worker holding `claim_token` may complete a row — a worker
    /// whose claim was reaped and reassigned must not stomp the reclaiming
    /// worker's in-flight attempt (§5).
    pub async fn mark_completed(&self, id: Uuid, claim_token: Uuid) -> Result<(), EngineError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "UPDATE email_queue SET status = 'completed', claim_token = NULL, claim_deadline = NULL, updated_at = now() WHERE id = $1 AND claim_token = $2",
                [id.into(), claim_token.into()],
            ))
            .await?;
        Ok(())
    }

    /// Record a failed attempt: schedule a retry with backoff, or move to
    /// the dead letter queue once `max_attempts` is reached. Scoped to
    /// `claim_token`, same rationale as `mark_completed`.
    pub async fn schedule_retry(&self, id: Uuid, claim_token: Uuid, error: &str) -> Result<(), EngineError> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT attempts, max_attempts FROM email_queue WHERE id = $1 AND claim_token = $2",
                [id.into(), claim_token.into()],
            ))
            .await?
            .ok_or_else(|| EngineError::Internal(format!("queue row {id} vanished or reclaimed")))?;

        let attempts: i32 = row.try_get("", "attempts")?;
        let max_attempts: i32 = row.try_get("", "max_attempts")?;
        let new_attempts = attempts + 1;

        if new_attempts >= max_attempts {
            self.move_to_dlq(id, claim_token, error).await?;
            return Ok(());
        }

        let next_retry_at = Utc::now() + backoff_for_attempt(new_attempts as u32);

        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_queue
                   SET status = 'failed_retry', attempts = $1, last_error = $2,
                       next_retry_at = $3, claim_token = NULL, claim_deadline = NULL, updated_at = now()
                   WHERE id = $4 AND claim_token = $5"#,
                [
                    new_attempts.into(),
                    error.into(),
                    next_retry_at.into(),
                    id.into(),
                    claim_token.into(),
                ],
            ))
            .await?;

        Ok(())
    }

    /// Freeze the row into `email_dead_letter_queue` and mark it `dead`.
    /// Scoped to `claim_token`, same rationale as `mark_completed`.
    pub async fn move_to_dlq(&self, id: Uuid, claim_token: Uuid, final_error: &str) -> Result<(), EngineError> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT recipient_email, email_type, template_data, attempts, max_attempts FROM email_queue WHERE id = $1 AND claim_token = $2",
                [id.into(), claim_token.into()],
            ))
            .await?
            .ok_or_else(|| EngineError::Internal(format!("queue row {id} vanished or reclaimed")))?;

        let recipient_email: String = row.try_get("", "recipient_email")?;
        let email_type: String = row.try_get("", "email_type")?;
        let template_data: serde_json::Value = row.try_get("", "template_data")?;
        let attempts: i32 = row.try_get("", "attempts")?;
        let max_attempts: i32 = row.try_get("", "max_attempts")?;

        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_dead_letter_queue
                   (id, queue_id, recipient_email, email_type, template_data, attempts, max_attempts,
                    final_error, failed_at, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())"#,
                [
                    Uuid::new_v4().into(),
                    id.into(),
                    recipient_email.into(),
                    email_type.into(),
                    template_data.into(),
                    (attempts + 1).into(),
                    max_attempts.into(),
                    final_error.into(),
                ],
            ))
            .await?;

        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_queue
                   SET status = 'dead', attempts = $1, last_error = $2,
                       claim_token = NULL, claim_deadline = NULL, updated_at = now()
                   WHERE id = $3 AND claim_token = $4"#,
                [(attempts + 1).into(), final_error.into(), id.into(), claim_token.into()],
            ))
            .await?;

        Ok(())
    }

    /// Append an `email_logs` row recording the outcome of one send
    /// attempt against a specific provider.
    pub async fn log_attempt(
        &self,
        queue_id: Uuid,
        provider: &str,
        provider_message_id: Option<&str>,
        success: bool,
        latency_ms: i64,
        error: Option<&str>,
    ) -> Result<(), EngineError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_logs
                   (id, queue_id, provider, provider_message_id, status, latency_ms, error, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, now())"#,
                [
                    Uuid::new_v4().into(),
                    queue_id.into(),
                    provider.into(),
                    provider_message_id.into(),
                    (if success { "sent" } else { "failed" }).into(),
                    (latency_ms as i32).into(),
                    error.into(),
                ],
            ))
            .await?;
        Ok(())
    }

    /// Reclaim rows whose claim deadline has passed without completing —
    /// crash recovery for workers that died mid-send (§4.7, §5).
    pub async fn reap_stuck(&self) -> Result<u64, EngineError> {
        let now = Utc::now();
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"UPDATE email_queue
                   SET status = 'failed_retry', claim_token = NULL, claim_deadline = NULL, updated_at = now()
                   WHERE status = 'in_flight' AND claim_deadline < $1"#,
                [now.into()],
            ))
            .await?;
        Ok(result.rows_affected())
    }

    /// Try to acquire the single-writer worker lock, valid for `ttl`.
    /// Returns the token on success, `None` if another worker currently
    /// holds it.
    pub async fn acquire_worker_lock(
        &self,
        name: &str,
        ttl: ChronoDuration,
    ) -> Result<Option<Uuid>, EngineError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token = Uuid::new_v4();

        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "DELETE FROM email_queue_lock WHERE name = $1 AND expires_at < $2",
                [name.into(), now.into()],
            ))
            .await?;

        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_queue_lock (name, token, acquired_at, expires_at)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (name) DO NOTHING"#,
                [name.into(), token.into(), now.into(), expires_at.into()],
            ))
            .await?;

        Ok(if result.rows_affected() > 0 {
            Some(token)
        } else {
            None
        })
    }

    /// Release the worker lock, but only if `token` still matches — a
    /// crashed worker's lock is released implicitly by `ttl` expiry, not by
    /// a later holder's release call.
    pub async fn release_worker_lock(&self, name: &str, token: Uuid) -> Result<(), EngineError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "DELETE FROM email_queue_lock WHERE name = $1 AND token = $2",
                [name.into(), token.into()],
            ))
            .await?;
        Ok(())
    }
}

fn email_type_str(email_type: &EmailType) -> &'static str {
    match email_type {
        EmailType::Auth => "auth",
        EmailType::Chat => "chat",
        EmailType::FoodListing => "food_listing",
        EmailType::Feedback => "feedback",
        EmailType::ReviewReminder => "review_reminder",
        EmailType::Newsletter => "newsletter",
        EmailType::Announcement => "announcement",
    }
}

fn parse_email_type(s: &str) -> EmailType {
    match s {
        "auth" => EmailType::Auth,
        "chat" => EmailType::Chat,
        "food_listing" => EmailType::FoodListing,
        "feedback" => EmailType::Feedback,
        "review_reminder" => EmailType::ReviewReminder,
        "newsletter" => EmailType::Newsletter,
        _ => EmailType::Announcement,
    }
}

fn parse_status(s: &str) -> QueueStatus {
    match s {
        "queued" => QueueStatus::Queued,
        "in_flight" => QueueStatus::InFlight,
        "completed" => QueueStatus::Completed,
        "failed_retry" => QueueStatus::FailedRetry,
        _ => QueueStatus::Dead,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let first = backoff_for_attempt(1);
        assert!(first.num_seconds() >= 60 && first.num_seconds() < 120);

        let second = backoff_for_attempt(2);
        assert!(second.num_seconds() >= 120 && second.num_seconds() < 240);

        let large = backoff_for_attempt(30);
        assert_eq!(large.num_seconds(), BACKOFF_MAX_SECS);
    }
}
