//! HTTP + worker/monitor binary hosting the multi-provider transactional
//! email delivery engine (`email-core`).
//!
//! Wires together secrets resolution, the Postgres-backed queue/quota/
//! health/suppression stores, the three provider adapters, and the axum
//! surface from §6, then drives the worker and monitor ticks on their own
//! intervals until shutdown.

mod auth;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use core_config::{app_info, Environment, FromEnv};
use database::postgres::{connect_from_config_with_retry, run_migrations, PostgresConfig};
use email_core::monitor::AlertDeduper;
use email_core::provider::brevo::BrevoAdapter;
use email_core::provider::resend::ResendAdapter;
use email_core::provider::ses::SesAdapter;
use email_core::{HealthTracker, RateLimiter, Vault, WorkerContext};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::state::AppState;

const WORKER_TICK_INTERVAL: Duration = Duration::from_secs(15);
const MONITOR_TICK_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    observability::init_metrics();
    email_core::metrics::describe();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, ?environment, "starting email engine");

    let pg_config = PostgresConfig::from_env().wrap_err("failed to load PostgreSQL configuration")?;
    info!("connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("failed to connect to PostgreSQL")?;
    run_migrations::<migration::Migrator>(&db, app_info.name)
        .await
        .wrap_err("failed to run database migrations")?;
    info!("connected to PostgreSQL and migrations are up to date");

    let cron_secret = core_config::env_required("CRON_SECRET")
        .wrap_err("CRON_SECRET must be set (gates /v1/queue/process and /v1/health/monitor)")?;

    let worker = Arc::new(build_worker_context().await);
    let dedup = Arc::new(AlertDeduper::new());

    let state = AppState {
        db: db.clone(),
        worker: worker.clone(),
        dedup: dedup.clone(),
        app_info,
        cron_secret: Arc::from(cron_secret.as_str()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    spawn_worker_loop(db.clone(), worker.clone(), shutdown_rx.clone());
    spawn_monitor_loop(db.clone(), worker.clone(), dedup.clone(), shutdown_rx.clone());

    let port: u16 = core_config::env_or_default("PORT", "8080")
        .parse()
        .unwrap_or(8080);
    let host = core_config::env_or_default("HOST", "0.0.0.0");
    let addr = format!("{host}:{port}");

    let app = routes::build_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!(%addr, "email engine listening");

    let mut shutdown_rx_http = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx_http.changed().await;
        })
        .await
        .wrap_err("HTTP server failed")?;

    info!("email engine stopped");
    Ok(())
}

async fn build_worker_context() -> WorkerContext {
    let vault = Arc::new(Vault::from_env());

    let resend_key = vault
        .get_credentials(email_core::models::Provider::Resend)
        .await
        .ok()
        .flatten()
        .map(|c| c.api_key)
        .unwrap_or_default();
    let brevo_key = vault
        .get_credentials(email_core::models::Provider::Brevo)
        .await
        .ok()
        .flatten()
        .map(|c| c.api_key)
        .unwrap_or_default();
    let ses_creds = vault
        .get_credentials(email_core::models::Provider::Ses)
        .await
        .ok()
        .flatten();

    let region = core_config::env_or_default("AWS_REGION", "us-east-1");
    let (ses_access_key, ses_secret_key) = match ses_creds {
        Some(c) => (c.api_key, c.secret_key.unwrap_or_default()),
        None => (String::new(), String::new()),
    };

    WorkerContext {
        vault,
        health: Arc::new(HealthTracker::new()),
        rate_limiter: Arc::new(RateLimiter::default()),
        resend: Arc::new(ResendAdapter::new(resend_key)),
        brevo: Arc::new(BrevoAdapter::new(brevo_key)),
        ses: Arc::new(SesAdapter::new(ses_access_key, ses_secret_key, region)),
    }
}

fn spawn_worker_loop(
    db: sea_orm::DatabaseConnection,
    worker: Arc<WorkerContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WORKER_TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let result = email_core::process_queue(&db, &worker).await;
                    if !result.skipped {
                        info!(
                            processed = result.processed,
                            successful = result.successful,
                            failed = result.failed,
                            moved_to_dlq = result.moved_to_dlq,
                            duration_ms = result.duration_ms,
                            "worker tick complete"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("worker loop shutting down");
                        break;
                    }
                }
            }
        }
    });
}

fn spawn_monitor_loop(
    db: sea_orm::DatabaseConnection,
    worker: Arc<WorkerContext>,
    dedup: Arc<AlertDeduper>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MONITOR_TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let result = email_core::monitor_health(
                        &db,
                        &worker,
                        &dedup,
                        email_core::MonitorMode::Full,
                    )
                    .await;
                    for alert in &result.alerts {
                        warn!(
                            provider = %alert.provider,
                            severity = ?alert.severity,
                            message = %alert.message,
                            "health alert"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("monitor loop shutting down");
                        break;
                    }
                }
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }

    Ok(())
}
