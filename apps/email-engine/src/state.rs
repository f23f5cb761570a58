use std::sync::Arc;

use core_config::AppInfo;
use email_core::{monitor::AlertDeduper, worker::WorkerContext};
use sea_orm::DatabaseConnection;

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub worker: Arc<WorkerContext>,
    pub dedup: Arc<AlertDeduper>,
    pub app_info: AppInfo,
    pub cron_secret: Arc<str>,
}
