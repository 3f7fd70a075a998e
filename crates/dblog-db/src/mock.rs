//! Mock driver for deterministic testing.
//!
//! Records every call it receives so tests can assert on what reached the
//! wrapped connection, and returns canned results or injected errors.
//!
//! ## Usage
//!
//! ```rust
//! use dblog_db::mock::MockDriver;
//! use dblog_db::{Capabilities, Conn, Driver};
//!
//! # async fn demo() {
//! let mock = MockDriver::new()
//!     .with_capabilities(Capabilities::none())
//!     .with_rows_affected(3);
//! let calls = mock.calls();
//!
//! let mut conn = mock.open("mock://").await.unwrap();
//! let stmt = conn.prepare("DELETE FROM users").await.unwrap();
//! let res = conn.exec_statement(&stmt, &[]).await.unwrap();
//! assert_eq!(res.rows_affected, 3);
//! assert_eq!(calls.methods(), vec!["prepare", "exec_statement"]);
//! assert_eq!(calls.open_count(), 1);
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dblog_core::{NamedValue, RequestContext, Value};

use crate::driver::{Capabilities, Conn, Driver, ExecResult, Rows, Statement};
use crate::error::{DriverError, Result};

type ErrorFactory = Arc<dyn Fn() -> DriverError + Send + Sync>;

/// One call received by a [`MockConn`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: &'static str,
    pub query: String,
    pub args: Vec<Value>,
    /// Correlation id of the context passed in, `""` for context-free calls.
    pub correlation_id: String,
}

/// Shared call log of every connection opened from one [`MockDriver`].
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    calls: Arc<Mutex<Vec<MockCall>>>,
    opens: Arc<AtomicUsize>,
}

impl MockCalls {
    pub fn all(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of successful `open` calls on the driver.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Method names in call order.
    pub fn methods(&self) -> Vec<&'static str> {
        self.all().into_iter().map(|c| c.method).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, call: MockCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[derive(Clone)]
struct MockConfig {
    capabilities: Capabilities,
    rows_affected: u64,
    rows: Rows,
    num_input: Option<usize>,
    error: Option<ErrorFactory>,
    /// Remaining injected failures, shared by every connection.
    failures: Option<(Arc<AtomicUsize>, ErrorFactory)>,
    open_error: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::all(),
            rows_affected: 0,
            rows: Rows::default(),
            num_input: None,
            error: None,
            failures: None,
            open_error: None,
        }
    }
}

/// Mock driver for testing.
#[derive(Clone, Default)]
pub struct MockDriver {
    config: Arc<MockConfig>,
    calls: MockCalls,
}

impl MockDriver {
    /// Create a mock supporting every fast path and returning empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set which fast paths opened connections implement.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        Arc::make_mut(&mut self.config).capabilities = capabilities;
        self
    }

    /// Set the affected row count returned by exec calls.
    pub fn with_rows_affected(mut self, n: u64) -> Self {
        Arc::make_mut(&mut self.config).rows_affected = n;
        self
    }

    /// Set the result set returned by query calls.
    pub fn with_rows(mut self, rows: Rows) -> Self {
        Arc::make_mut(&mut self.config).rows = rows;
        self
    }

    /// Set the parameter count reported by prepared statements.
    pub fn with_num_input(mut self, n: usize) -> Self {
        Arc::make_mut(&mut self.config).num_input = Some(n);
        self
    }

    /// Make every exec/query call fail with the error built by `make`.
    pub fn with_error<F>(mut self, make: F) -> Self
    where
        F: Fn() -> DriverError + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.config).error = Some(Arc::new(make));
        self
    }

    /// Make the next `n` exec/query calls fail with the error built by `make`,
    /// counted across every connection the driver opens.
    ///
    /// A connection that returns a connection-level error stays dead, so a
    /// later call on it gets [`DriverError::ConnClosed`].
    pub fn with_failures<F>(mut self, n: usize, make: F) -> Self
    where
        F: Fn() -> DriverError + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.config).failures =
            Some((Arc::new(AtomicUsize::new(n)), Arc::new(make)));
        self
    }

    /// Make `open` fail with `DriverError::Other(message)`.
    pub fn with_open_error(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).open_error = Some(message.into());
        self
    }

    /// Handle on the call log shared by all connections from this driver.
    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn open(&self, _dsn: &str) -> Result<Box<dyn Conn>> {
        if let Some(message) = &self.config.open_error {
            return Err(DriverError::Other(message.clone()));
        }
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConn {
            config: Arc::clone(&self.config),
            calls: self.calls.clone(),
            closed: false,
        }))
    }
}

/// Connection opened by [`MockDriver`].
pub struct MockConn {
    config: Arc<MockConfig>,
    calls: MockCalls,
    closed: bool,
}

impl MockConn {
    fn record(
        &mut self,
        method: &'static str,
        ctx: Option<&RequestContext>,
        query: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        if self.closed {
            return Err(DriverError::ConnClosed);
        }
        self.calls.push(MockCall {
            method,
            query: query.to_string(),
            args,
            correlation_id: ctx.map(|c| c.correlation_id().to_string()).unwrap_or_default(),
        });
        let err = match (&self.config.error, &self.config.failures) {
            (Some(make), _) => make(),
            (None, Some((remaining, make))) if take_failure(remaining) => make(),
            _ => return Ok(()),
        };
        if err.is_bad_connection() {
            self.closed = true;
        }
        Err(err)
    }

    fn exec_result(&self) -> ExecResult {
        ExecResult {
            rows_affected: self.config.rows_affected,
        }
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Conn for MockConn {
    fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    async fn prepare(&mut self, query: &str) -> Result<Statement> {
        if self.closed {
            return Err(DriverError::ConnClosed);
        }
        self.calls.push(MockCall {
            method: "prepare",
            query: query.to_string(),
            args: Vec::new(),
            correlation_id: String::new(),
        });
        Ok(Statement::new(
            query,
            self.config.num_input,
            self.config.rows.columns.clone(),
        ))
    }

    async fn exec_statement(
        &mut self,
        stmt: &Statement,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.record("exec_statement", None, stmt.query(), NamedValue::values(args))?;
        Ok(self.exec_result())
    }

    async fn query_statement(&mut self, stmt: &Statement, args: &[NamedValue]) -> Result<Rows> {
        self.record("query_statement", None, stmt.query(), NamedValue::values(args))?;
        Ok(self.config.rows.clone())
    }

    async fn ping(&mut self) -> Result<()> {
        if self.closed {
            return Err(DriverError::ConnClosed);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult> {
        if !self.config.capabilities.exec {
            return Err(DriverError::Skip);
        }
        self.record("exec", None, query, args.to_vec())?;
        Ok(self.exec_result())
    }

    async fn exec_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        if !self.config.capabilities.exec_context {
            return Err(DriverError::Skip);
        }
        self.record("exec_context", Some(ctx), query, NamedValue::values(args))?;
        Ok(self.exec_result())
    }

    async fn query(&mut self, query: &str, args: &[Value]) -> Result<Rows> {
        if !self.config.capabilities.query {
            return Err(DriverError::Skip);
        }
        self.record("query", None, query, args.to_vec())?;
        Ok(self.config.rows.clone())
    }

    async fn query_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Rows> {
        if !self.config.capabilities.query_context {
            return Err(DriverError::Skip);
        }
        self.record("query_context", Some(ctx), query, NamedValue::values(args))?;
        Ok(self.config.rows.clone())
    }
}
