//! dblog-api - HTTP boundary for dblog
//!
//! Provides the correlation-id middleware that stamps every inbound request
//! with a [`RequestContext`](dblog_core::RequestContext), plus a small users
//! service whose database calls run through the logging driver.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use dblog_db::Database;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::router;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }
}
