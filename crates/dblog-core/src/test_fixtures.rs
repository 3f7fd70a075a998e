//! Test fixtures shared by the dblog crates.
//!
//! [`CapturedLogs`] is an in-memory log sink: hand a clone to
//! [`SqlLogger::with_writer`](crate::logging::SqlLogger::with_writer) and
//! read back everything written to it.
//!
//! ```
//! use dblog_core::test_fixtures::capturing_logger;
//! use dblog_core::RequestContext;
//!
//! let (logger, logs) = capturing_logger();
//! logger.log_operation(&RequestContext::background(), "Exec", "SELECT 1", None);
//! assert!(logs.contents().contains("Exec correlation_id="));
//! ```

use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::logging::{LogConfig, SqlLogger};

/// Shared in-memory buffer implementing `MakeWriter`.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Number of SQL records captured (one per `correlation_id=` marker).
    pub fn record_count(&self) -> usize {
        self.contents().matches(" correlation_id=").count()
    }

    pub fn clear(&self) {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Writer handed out by [`CapturedLogs`].
pub struct CapturedWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

/// A text-format, timestamp-free logger writing into a fresh buffer.
pub fn capturing_logger() -> (SqlLogger, CapturedLogs) {
    let logs = CapturedLogs::new();
    let logger = SqlLogger::with_writer(&LogConfig::default().timestamps(false), logs.clone());
    (logger, logs)
}
