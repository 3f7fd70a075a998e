//! # dblog-db
//!
//! Driver layer for dblog.
//!
//! This crate provides:
//! - The [`Driver`]/[`Conn`] capability surface drivers implement
//! - [`LoggingDriver`], a decorator that logs every exec/query call
//! - [`PgDriver`], a PostgreSQL driver built on sqlx
//! - [`DriverRegistry`] for selecting drivers by name
//! - [`Database`], the caller-facing handle that falls back to the prepared
//!   statement path when a connection skips a fast path
//!
//! ## Example
//!
//! ```rust,ignore
//! use dblog_db::{Database, DriverRegistry, DRIVER_NAME};
//! use dblog_core::{RequestContext, SqlLogger, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = DriverRegistry::with_defaults(SqlLogger::default());
//!     let db = Database::open(&registry, DRIVER_NAME, "postgres://localhost/postgres").await?;
//!
//!     let ctx = RequestContext::background().with_correlation_id("1234");
//!     db.query_with(&ctx, "SELECT * FROM users WHERE id = $1", &[Value::from(1)]).await?;
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod driver;
pub mod error;
pub mod logging_driver;
pub mod mock;
pub mod postgres;
pub mod registry;

pub use database::Database;
pub use driver::{Capabilities, Conn, Driver, ExecResult, Operation, Rows, Statement};
pub use error::{DriverError, Result};
pub use logging_driver::{LoggingConn, LoggingDriver};
pub use postgres::{PgConn, PgDriver};
pub use registry::{DriverRegistry, DRIVER_NAME, POSTGRES_DRIVER_NAME};

// Re-export core types
pub use dblog_core::{NamedValue, RequestContext, SqlLogger, Value};
