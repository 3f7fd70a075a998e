//! Driver error type.
//!
//! Errors produced by a wrapped driver travel through the logging decorator
//! untouched, so callers can match on the original variant (for example
//! `DriverError::Database(sqlx::Error::RowNotFound)`).

use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The connection does not implement the requested fast path; the caller
    /// should retry through prepare + execute.
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request context deadline passed before the call completed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// No driver registered under the requested name
    #[error("Unknown driver {0:?} (forgotten registration?)")]
    UnknownDriver(String),

    /// A driver is already registered under this name
    #[error("Driver already registered: {0}")]
    DuplicateDriver(String),

    /// The connection was closed
    #[error("Connection is closed")]
    ConnClosed,

    /// Argument count does not match the prepared statement
    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    /// An argument cannot be converted to the statement's parameter type
    #[error("Cannot bind argument ${ordinal} as {pg_type}: {reason}")]
    InvalidArgument {
        ordinal: usize,
        pg_type: String,
        reason: String,
    },

    /// A result column has a type with no value mapping
    #[error("Unsupported type {pg_type} for column {column:?}")]
    UnsupportedType { column: String, pg_type: String },

    /// Driver-specific failure
    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Whether this is the fast-path skip sentinel.
    pub fn is_skip(&self) -> bool {
        matches!(self, DriverError::Skip)
    }

    /// Whether the connection that produced this error is unusable.
    ///
    /// Covers transport failures, server-side termination (SQLSTATE class
    /// 08 and 57P01..57P03) and connections already closed underneath the
    /// caller.
    pub fn is_bad_connection(&self) -> bool {
        match self {
            DriverError::ConnClosed => true,
            DriverError::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db.code().map_or(false, |code| {
                    code.starts_with("08") || matches!(&*code, "57P01" | "57P02" | "57P03")
                }),
                _ => false,
            },
            _ => false,
        }
    }
}
