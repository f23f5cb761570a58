//! C8 — Worker Loop (§4.8): one tick claims a batch, fans out bounded
//! concurrency per email, and routes/rate-limits/reserves-quota/sends/
//! records-health for each one independently so a single bad row never
//! fails the tick.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;
use futures::stream::{self, StreamExt};
use sea_orm::DatabaseConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::health::HealthTracker;
use crate::models::{EmailType, Provider, ProcessQueueResult};
use crate::provider::EmailAdapter;
use crate::quota::QuotaLedger;
use crate::rate_limit::RateLimiter;
use crate::router::{Router, RoutingExclusions};
use crate::suppression::SuppressionList;
use crate::vault::Vault;
use crate::queue::{ClaimedEmail, QueueStore};

pub const WORKER_LOCK_NAME: &str = "email.queue.lock";
const LOCK_TTL: ChronoDuration = ChronoDuration::minutes(5);
const BATCH_SIZE: u32 = 100;
const CONCURRENCY: usize = 10;

/// Everything a worker tick needs, bundled so `apps/email-engine` only has
/// to construct this once at startup.
pub struct WorkerContext {
    pub vault: Arc<Vault>,
    pub health: Arc<HealthTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub resend: Arc<dyn EmailAdapter>,
    pub brevo: Arc<dyn EmailAdapter>,
    pub ses: Arc<dyn EmailAdapter>,
}

impl WorkerContext {
    fn adapter(&self, provider: Provider) -> Arc<dyn EmailAdapter> {
        match provider {
            Provider::Resend => self.resend.clone(),
            Provider::Brevo => self.brevo.clone(),
            Provider::Ses => self.ses.clone(),
        }
    }
}

/// Run one `ProcessQueue` tick (§6).
pub async fn process_queue(
    db: &DatabaseConnection,
    ctx: &WorkerContext,
) -> ProcessQueueResult {
    let started = Instant::now();
    let queue = QueueStore::new(db);

    let lock_token = match queue.acquire_worker_lock(WORKER_LOCK_NAME, LOCK_TTL).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            info!("worker tick skipped: lock held by another worker");
            return ProcessQueueResult {
                skipped: true,
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            };
        }
        Err(e) => {
            warn!(error = %e, "failed to acquire worker lock");
            return ProcessQueueResult {
                skipped: true,
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            };
        }
    };

    let result = run_tick(db, ctx, &queue).await;

    if let Err(e) = queue.release_worker_lock(WORKER_LOCK_NAME, lock_token).await {
        warn!(error = %e, "failed to release worker lock");
    }

    let mut result = result;
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

async fn run_tick(
    db: &DatabaseConnection,
    ctx: &WorkerContext,
    queue: &QueueStore<'_>,
) -> ProcessQueueResult {
    if let Err(e) = queue.reap_stuck().await {
        warn!(error = %e, "failed to reap stuck rows");
    }

    let claimed = match queue.claim_ready(BATCH_SIZE).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "failed to claim ready rows");
            return ProcessQueueResult::default();
        }
    };

    let outcomes: Vec<EmailOutcome> = stream::iter(claimed)
        .map(|email| process_one(db, ctx, email))
        .buffer_unordered(CONCURRENCY)
        .collect()
        .await;

    let mut result = ProcessQueueResult::default();
    for outcome in outcomes {
        result.processed += 1;
        match outcome {
            EmailOutcome::Sent => result.successful += 1,
            EmailOutcome::RateLimited => result.rate_limited += 1,
            EmailOutcome::Retrying => result.failed += 1,
            EmailOutcome::DeadLettered => {
                result.failed += 1;
                result.moved_to_dlq += 1;
            }
        }
    }
    result
}

enum EmailOutcome {
    Sent,
    RateLimited,
    Retrying,
    DeadLettered,
}

async fn process_one(db: &DatabaseConnection, ctx: &WorkerContext, email: ClaimedEmail) -> EmailOutcome {
    let queue = QueueStore::new(db);
    let vault_ref = &*ctx.vault;
    let router = Router::new(db, vault_ref, &ctx.health);

    let mut excluded = Vec::new();

    loop {
        let provider = match router
            .select_provider(&email.email_type, &RoutingExclusions::new(&excluded))
            .await
        {
            Some(p) => p,
            None => {
                schedule_retry(&queue, email.id, email.claim_token, "no provider available").await;
                return EmailOutcome::Retrying;
            }
        };

        if !ctx.rate_limiter.check_and_increment(provider) {
            schedule_retry(&queue, email.id, email.claim_token, "rate limited").await;
            return EmailOutcome::RateLimited;
        }

        let quota = QuotaLedger::new(db);
        match quota.try_reserve(provider).await {
            Ok(true) => {}
            Ok(false) => {
                excluded.push(provider);
                continue;
            }
            Err(e) => {
                warn!(error = %e, "quota reservation failed");
                schedule_retry(&queue, email.id, email.claim_token, "quota ledger error").await;
                return EmailOutcome::Retrying;
            }
        }

        return send_with_breaker(db, ctx, &queue, &email, provider).await;
    }
}

async fn send_with_breaker(
    db: &DatabaseConnection,
    ctx: &WorkerContext,
    queue: &QueueStore<'_>,
    email: &ClaimedEmail,
    provider: Provider,
) -> EmailOutcome {
    if !ctx.health.can_execute(provider) {
        if let Err(e) = QuotaLedger::new(db).refund(provider).await {
            warn!(error = %e, "failed to refund quota reservation");
        }
        schedule_retry(queue, email.id, email.claim_token, "circuit breaker open").await;
        return EmailOutcome::Retrying;
    }

    let adapter = ctx.adapter(provider);
    let started = Instant::now();
    let result = adapter.send(&email.recipient_email, &email.template_data).await;
    let latency_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(outcome) => {
            let _ = ctx
                .health
                .record_outcome(db, provider, true, latency_ms, None)
                .await;
            let _ = queue
                .log_attempt(
                    email.id,
                    provider.as_str(),
                    Some(&outcome.provider_message_id),
                    true,
                    latency_ms,
                    None,
                )
                .await;
            if let Err(e) = queue.mark_completed(email.id, email.claim_token).await {
                warn!(error = %e, "failed to mark email completed");
            }
            crate::metrics::record_sent(provider, latency_ms);
            EmailOutcome::Sent
        }
        Err(err) => {
            let _ = ctx
                .health
                .record_outcome(db, provider, false, latency_ms, Some(&err.to_string()))
                .await;
            let _ = queue
                .log_attempt(email.id, provider.as_str(), None, false, latency_ms, Some(&err.to_string()))
                .await;
            crate::metrics::record_send_failed(provider, err.is_retryable());

            if err.is_permanent_failure() {
                let suppression = SuppressionList::new(db);
                if let Err(e) = suppression.suppress(&email.recipient_email, "bounced").await {
                    warn!(error = %e, "failed to suppress recipient");
                }
                if let Err(e) = queue.move_to_dlq(email.id, email.claim_token, &err.to_string()).await {
                    warn!(error = %e, "failed to move email to dead letter queue");
                }
                crate::metrics::record_dead_lettered(provider);
                EmailOutcome::DeadLettered
            } else {
                schedule_retry(queue, email.id, email.claim_token, &err.to_string()).await;
                crate::metrics::record_retry_scheduled();
                EmailOutcome::Retrying
            }
        }
    }
}

async fn schedule_retry(queue: &QueueStore<'_>, id: Uuid, claim_token: Uuid, error: &str) {
    if let Err(e) = queue.schedule_retry(id, claim_token, error).await {
        warn!(error = %e, queue_id = %id, "failed to schedule retry");
    }
}

/// Expose `EmailType` here so callers that only need the worker surface
/// don't also have to import `crate::models`.
pub use EmailType as WorkerEmailType;
