//! C4 — Rate Limiter (§4.4): sliding window per `(provider, minute_bucket)`,
//! plus a per-recipient gate. In-process only — each worker process bounds
//! its own outbound rate; there's no persisted rate-limit table in the data
//! model (§3), unlike the quota ledger which must agree across processes.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::models::Provider;

const DEFAULT_PER_MINUTE: u32 = 10;

#[derive(Default)]
struct Bucket {
    minute: i64,
    count: u32,
}

/// Sliding-window limiter keyed by provider and, separately, by recipient.
pub struct RateLimiter {
    per_minute: u32,
    provider_buckets: Mutex<HashMap<Provider, Bucket>>,
    recipient_buckets: Mutex<HashMap<String, Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PER_MINUTE)
    }
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            provider_buckets: Mutex::new(HashMap::new()),
            recipient_buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically check-and-increment the current minute bucket for
    /// `provider`. Returns `true` if admitted, `false` if rate limited.
    /// Admission is charged whether or not the upstream call goes on to
    /// succeed (§5) — failures are not refunded.
    pub fn check_and_increment(&self, provider: Provider) -> bool {
        Self::check_and_increment_bucket(&self.provider_buckets, provider, self.per_minute)
    }

    /// Same gate, keyed by recipient rather than provider, to prevent one
    /// address from monopolizing a provider's budget.
    pub fn check_and_increment_recipient(&self, recipient_email: &str, limit_per_minute: u32) -> bool {
        Self::check_and_increment_bucket(
            &self.recipient_buckets,
            recipient_email.to_string(),
            limit_per_minute,
        )
    }

    fn check_and_increment_bucket<K: std::hash::Hash + Eq + Clone>(
        buckets: &Mutex<HashMap<K, Bucket>>,
        key: K,
        limit: u32,
    ) -> bool {
        let current_minute = Utc::now().timestamp() / 60;
        let mut buckets = buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets.entry(key).or_default();

        if bucket.minute != current_minute {
            bucket.minute = current_minute;
            bucket.count = 0;
        }

        if bucket.count >= limit {
            return false;
        }

        bucket.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_per_minute_limit() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check_and_increment(Provider::Brevo));
        assert!(limiter.check_and_increment(Provider::Brevo));
        assert!(limiter.check_and_increment(Provider::Brevo));
        assert!(!limiter.check_and_increment(Provider::Brevo));
    }

    #[test]
    fn tracks_providers_independently() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check_and_increment(Provider::Resend));
        assert!(!limiter.check_and_increment(Provider::Resend));
        assert!(limiter.check_and_increment(Provider::Ses));
    }
}
