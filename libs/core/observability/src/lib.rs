//! Observability utilities for the email engine.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Axum middleware for automatic per-request HTTP metrics
//!
//! Domain-specific metric recording (quota reservations, circuit breaker
//! state, worker tick outcomes) lives in `email-core`, which builds on the
//! `counter!`/`gauge!`/`histogram!` macros re-exported here rather than
//! owning a second Prometheus recorder.
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler};
//!
//! init_metrics();
//!
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod middleware;

pub use middleware::MetricsLayer;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup. Returns the
/// `PrometheusHandle` used to render the `/metrics` response.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();

        handle
    })
}

/// Get the metrics handle (must call `init_metrics` first).
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions shared across the HTTP surface.
///
/// Email-domain metric descriptions (quota, circuit breaker, worker tick)
/// are registered by `email_core::metrics` at the same startup point.
fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );
}
