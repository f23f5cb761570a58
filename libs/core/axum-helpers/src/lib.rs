//! # Axum Helpers
//!
//! A collection of utilities, middleware, and helpers for building Axum web applications.
//!
//! ## Features
//!
//! - **Server Management**: Easy server setup with graceful shutdown
//! - **Middleware**: Security headers, CORS
//! - **Error Handling**: Structured error responses with proper HTTP status codes
//! - **Health Checks**: Built-in liveness/readiness endpoints
//! - **Extractors**: Custom extractors for common use cases
//!
//! ## Quick Start
//!
//! ```ignore
//! use axum::Router;
//! use axum_helpers::server::create_app;
//! use core_config::server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router: Router = Router::new();
//!     let config = ServerConfig::default();
//!     create_app(router, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod errors;
pub mod extractors;
pub mod middleware;
pub mod server;
pub mod shutdown;

// Re-export commonly used types
pub use cleanup::CleanupCoordinator;
pub use errors::{AppError, ErrorCode, ErrorResponse};
pub use server::{create_app, create_production_app, health_router, HealthResponse, ReadyResponse};
pub use shutdown::{shutdown_signal, ShutdownCoordinator};

// Re-export middleware functions
pub use middleware::cors::{create_cors_layer, create_permissive_cors_layer};
pub use middleware::security::security_headers;

// Re-export extractors
pub use extractors::{UuidPath, ValidatedJson};
