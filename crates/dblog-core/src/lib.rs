//! # dblog-core
//!
//! Core types and helpers shared by the dblog crates.
//!
//! This crate provides the argument value model, the SQL pretty-printer used
//! in log lines, the request correlation context, and the logging facade that
//! combines them into one structured record per database call.

pub mod correlation;
pub mod error;
pub mod formatter;
pub mod logging;
pub mod value;

// Always compiled so integration tests in other crates can capture log output
pub mod test_fixtures;

// Re-export commonly used types at crate root
pub use correlation::{
    generate_correlation_id, get_correlation_id, set_correlation_id, RequestContext,
    CORRELATION_ID_HEADER,
};
pub use error::{Error, Result};
pub use formatter::{format_query, format_query_with_args, Args};
pub use logging::{LogConfig, LogFormat, SqlLogger};
pub use value::{NamedValue, Value};
