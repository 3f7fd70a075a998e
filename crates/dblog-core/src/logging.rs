//! SQL logging facade.
//!
//! [`SqlLogger`] turns one intercepted database call into exactly one INFO
//! record:
//!
//! ```text
//! 2024-05-01T10:00:00.000000Z  INFO ExecContext correlation_id=1234
//! Script:
//!         INSERT INTO users (name, email)
//!         VALUES ($1, $2)
//! Args:
//!       [John Doe, j.example@example.com]
//! ```
//!
//! The logger owns its `tracing` dispatcher instead of relying on a
//! process-wide default, so every decorator gets its sink explicitly.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Request failed, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, one record per intercepted SQL call |
//! | DEBUG | Decision points (capability fallback, driver selection) |
//! | TRACE | Per-row decoding details |

use std::str::FromStr;

use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::MakeWriter;

use crate::correlation::RequestContext;
use crate::error::{Error, Result};
use crate::formatter::{format_query_with_args, Args};

/// Target used for the per-call SQL records.
pub const SQL_LOG_TARGET: &str = "dblog::sql";

/// Output encoding for [`SqlLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "console" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("unknown log format: {}", other))),
        }
    }
}

/// Configuration for a [`SqlLogger`]'s own output pipeline.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level emitted; SQL records are INFO.
    pub level: Level,
    pub format: LogFormat,
    /// ANSI colors in text output.
    pub ansi: bool,
    /// Prefix each record with an RFC 3339 timestamp.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            ansi: false,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the environment.
    ///
    /// Environment variables:
    ///   SQL_LOG_LEVEL - minimum level (default: "info")
    ///   LOG_FORMAT    - "json" or "text" (default: "text")
    ///   LOG_ANSI      - "true"/"1" to enable ANSI colors (default: off)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("SQL_LOG_LEVEL") {
            config.level = Level::from_str(level.trim())
                .map_err(|_| Error::Config(format!("invalid SQL_LOG_LEVEL: {}", level)))?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Ok(ansi) = std::env::var("LOG_ANSI") {
            config.ansi = ansi == "true" || ansi == "1";
        }

        Ok(config)
    }

    /// Set the minimum level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output encoding.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors.
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Enable or disable timestamps.
    pub fn timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    System,
    Off,
}

impl FormatTime for Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        match self {
            Timer::System => SystemTime.format_time(w),
            Timer::Off => Ok(()),
        }
    }
}

/// Emits one structured record per intercepted SQL call.
#[derive(Clone)]
pub struct SqlLogger {
    dispatch: Dispatch,
}

impl std::fmt::Debug for SqlLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlLogger").finish_non_exhaustive()
    }
}

impl Default for SqlLogger {
    /// Text records at INFO and above, written to stdout.
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl SqlLogger {
    /// Build a logger writing to stdout with the given configuration.
    pub fn new(config: &LogConfig) -> Self {
        Self::with_writer(config, std::io::stdout)
    }

    /// Build a logger writing to an arbitrary sink.
    pub fn with_writer<W>(config: &LogConfig, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let timer = if config.timestamps {
            Timer::System
        } else {
            Timer::Off
        };

        let builder = tracing_subscriber::fmt()
            .with_max_level(config.level)
            .with_target(false)
            .with_ansi(config.ansi)
            .with_timer(timer)
            .with_writer(writer);

        let dispatch = match config.format {
            LogFormat::Text => Dispatch::new(builder.finish()),
            LogFormat::Json => Dispatch::new(builder.json().finish()),
        };

        Self { dispatch }
    }

    /// Log one database operation.
    ///
    /// `args` of `None` means the call carried no argument list, and the
    /// `Args:` block is omitted.
    pub fn log_operation(
        &self,
        ctx: &RequestContext,
        operation: &str,
        sql: &str,
        args: Option<Args<'_>>,
    ) {
        let message = render_record(ctx, operation, sql, args);
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(target: SQL_LOG_TARGET, "{}", message);
        });
    }
}

/// Render the message body of a SQL record.
pub fn render_record(
    ctx: &RequestContext,
    operation: &str,
    sql: &str,
    args: Option<Args<'_>>,
) -> String {
    format!(
        "{} correlation_id={}\n{}",
        operation,
        ctx.correlation_id(),
        format_query_with_args(sql, args)
    )
}
