//! Prometheus metric descriptions and recorders for the delivery engine.
//!
//! Built on the `counter!`/`gauge!`/`histogram!` macros `observability`
//! re-exports; this module owns no recorder of its own, only the
//! email-domain metric names and the call sites that update them.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::models::Provider;

/// Registers descriptions for every email-domain metric. Call once at
/// startup, after `observability::init_metrics()` has installed the
/// recorder.
pub fn describe() {
    describe_counter!("email_enqueued_total", "Emails accepted by the enqueue entry point");
    describe_counter!(
        "email_enqueue_rejected_total",
        "Enqueue requests rejected (suppressed recipient, invalid argument)"
    );
    describe_counter!("email_sent_total", "Emails successfully delivered, by provider");
    describe_counter!("email_send_failed_total", "Delivery attempts that failed, by provider and kind");
    describe_counter!("email_dead_lettered_total", "Emails moved to the dead letter queue");
    describe_counter!("email_retry_scheduled_total", "Emails scheduled for a retry attempt");
    describe_counter!(
        "email_circuit_breaker_trips_total",
        "Times a provider's circuit breaker opened"
    );
    describe_gauge!(
        "email_queue_depth",
        "Rows currently ready or in flight in the email queue"
    );
    describe_histogram!(
        "email_provider_latency_seconds",
        "Upstream provider call latency, by provider"
    );
}

pub fn record_enqueued(email_type: &str) {
    counter!("email_enqueued_total", "email_type" => email_type.to_string()).increment(1);
}

pub fn record_enqueue_rejected(reason: &str) {
    counter!("email_enqueue_rejected_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_sent(provider: Provider, latency_ms: i64) {
    counter!("email_sent_total", "provider" => provider.as_str()).increment(1);
    histogram!("email_provider_latency_seconds", "provider" => provider.as_str())
        .record(latency_ms as f64 / 1000.0);
}

pub fn record_send_failed(provider: Provider, retryable: bool) {
    let kind = if retryable { "retryable" } else { "permanent" };
    counter!("email_send_failed_total", "provider" => provider.as_str(), "kind" => kind)
        .increment(1);
}

pub fn record_dead_lettered(provider: Provider) {
    counter!("email_dead_lettered_total", "provider" => provider.as_str()).increment(1);
}

pub fn record_retry_scheduled() {
    counter!("email_retry_scheduled_total").increment(1);
}

pub fn record_breaker_tripped(provider: Provider) {
    counter!("email_circuit_breaker_trips_total", "provider" => provider.as_str()).increment(1);
}

pub fn record_queue_depth(depth: u64) {
    gauge!("email_queue_depth").set(depth as f64);
}
