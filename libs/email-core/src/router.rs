//! C6 — Router (§4.6): pure selection over a fixed priority list, filtering
//! out unconfigured, circuit-open, quota-exhausted and locally-marked
//! unavailable providers, then picking the highest health score with ties
//! broken by priority order.
//!
//! Circuit state is read from the in-process `HealthTracker`, not the
//! persisted `circuit_state` column — the column lags the breaker's own
//! Open→HalfOpen timeout, which would otherwise strand an open provider
//! permanently excluded instead of letting a trial request through.

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use crate::health::HealthTracker;
use crate::models::{EmailType, Provider};
use crate::vault::Vault;

/// A provider the router excludes for this routing decision only (e.g. its
/// quota was found exhausted earlier in the same worker-loop retry pass),
/// without touching persisted state.
pub struct RoutingExclusions<'a> {
    excluded: &'a [Provider],
}

impl<'a> RoutingExclusions<'a> {
    pub fn none() -> RoutingExclusions<'static> {
        RoutingExclusions { excluded: &[] }
    }

    pub fn new(excluded: &'a [Provider]) -> Self {
        Self { excluded }
    }
}

pub struct Router<'a> {
    db: &'a DatabaseConnection,
    vault: &'a Vault,
    health: &'a HealthTracker,
}

impl<'a> Router<'a> {
    pub fn new(db: &'a DatabaseConnection, vault: &'a Vault, health: &'a HealthTracker) -> Self {
        Self { db, vault, health }
    }

    /// Select the best available provider for `email_type`, or `None` if no
    /// candidate survives filtering.
    pub async fn select_provider(
        &self,
        email_type: &EmailType,
        exclusions: &RoutingExclusions<'_>,
    ) -> Option<Provider> {
        let configured = self.vault.list_configured().await;
        let priority = Provider::priority_for(email_type);

        let mut candidates = Vec::new();
        for provider in priority {
            let provider = *provider;
            if exclusions.excluded.contains(&provider) {
                continue;
            }
            if !configured.contains(&provider) {
                continue;
            }
            if !self.health.can_execute(provider) {
                continue;
            }
            if self.is_quota_exhausted(provider).await {
                continue;
            }
            let health_score = self.health_score(provider).await;
            candidates.push((provider, health_score));
        }

        if candidates.is_empty() {
            return None;
        }

        let best_score = candidates.iter().map(|(_, s)| *s).max().unwrap_or(0);
        candidates
            .into_iter()
            .find(|(_, score)| *score == best_score)
            .map(|(provider, _)| provider)
    }

    async fn is_quota_exhausted(&self, provider: Provider) -> bool {
        let today = chrono::Utc::now().date_naive();
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT emails_sent, daily_limit FROM email_provider_quota WHERE provider = $1 AND date_utc = $2",
                [provider.as_str().into(), today.into()],
            ))
            .await
            .ok()
            .flatten();

        match row {
            Some(r) => {
                let sent: i32 = r.try_get("", "emails_sent").unwrap_or(0);
                let limit: i32 = r.try_get("", "daily_limit").unwrap_or(provider.default_daily_limit());
                sent >= limit
            }
            None => false,
        }
    }

    async fn health_score(&self, provider: Provider) -> i32 {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT health_score FROM email_provider_health_metrics WHERE provider = $1",
                [provider.as_str().into()],
            ))
            .await
            .ok()
            .flatten();

        match row {
            Some(r) => r.try_get("", "health_score").unwrap_or(100),
            None => 100,
        }
    }
}
