//! Server infrastructure module.
//!
//! This module provides:
//! - Application startup with graceful shutdown
//! - Health and readiness endpoints
//!
//! # Example
//!
//! ```ignore
//! use axum_helpers::server::{create_app, health_router};
//! use core_config::{server::ServerConfig, app_info};
//!
//! let app = axum::Router::new().merge(health_router(app_info!()));
//! create_app(app, &ServerConfig::default()).await?;
//! ```

pub mod app;
pub mod health;

pub use app::{create_app, create_production_app};
pub use health::{
    health_router, run_health_checks, HealthCheckFuture, HealthResponse, ReadyResponse,
    ServiceStatus,
};
