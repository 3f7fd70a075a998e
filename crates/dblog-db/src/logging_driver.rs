//! Logging driver decorator.
//!
//! [`LoggingDriver`] wraps any [`Driver`]. Every connection it opens is a
//! [`LoggingConn`], which logs each exec/query call through its
//! [`SqlLogger`] and then forwards the call untouched. Results and errors
//! from the wrapped connection are returned as-is.
//!
//! The wrapped connection's [`Capabilities`] are read once, at open time. A
//! fast path the inner connection lacks is still logged, then answered with
//! [`DriverError::Skip`] so the caller retries through prepare + execute.

use async_trait::async_trait;
use tracing::{debug, info};

use dblog_core::{Args, NamedValue, RequestContext, SqlLogger, Value};

use crate::driver::{Capabilities, Conn, Driver, ExecResult, Operation, Rows, Statement};
use crate::error::{DriverError, Result};

/// Driver decorator adding per-call SQL logging.
pub struct LoggingDriver<D> {
    inner: D,
    logger: SqlLogger,
}

impl<D: Driver> LoggingDriver<D> {
    pub fn new(inner: D, logger: SqlLogger) -> Self {
        Self { inner, logger }
    }
}

#[async_trait]
impl<D: Driver> Driver for LoggingDriver<D> {
    async fn open(&self, dsn: &str) -> Result<Box<dyn Conn>> {
        let conn = self.inner.open(dsn).await?;
        let conn = LoggingConn::new(conn, self.logger.clone());
        let caps = conn.inner_capabilities();

        info!(
            subsystem = "db",
            component = "logging_driver",
            op = "open",
            exec = caps.exec,
            exec_context = caps.exec_context,
            query = caps.query,
            query_context = caps.query_context,
            "Opened logging connection"
        );

        Ok(Box::new(conn))
    }
}

/// Connection decorator created by [`LoggingDriver::open`].
pub struct LoggingConn {
    inner: Box<dyn Conn>,
    inner_caps: Capabilities,
    logger: SqlLogger,
}

impl LoggingConn {
    /// Wrap an already open connection, resolving its capabilities now.
    pub fn new(inner: Box<dyn Conn>, logger: SqlLogger) -> Self {
        let inner_caps = inner.capabilities();
        Self {
            inner,
            inner_caps,
            logger,
        }
    }

    /// Capabilities of the wrapped connection.
    pub fn inner_capabilities(&self) -> Capabilities {
        self.inner_caps
    }

    fn log(&self, ctx: &RequestContext, op: Operation, query: &str, args: Args<'_>) {
        self.logger.log_operation(ctx, op.as_str(), query, Some(args));
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.inner_caps.supports(op) {
            Ok(())
        } else {
            debug!(
                subsystem = "db",
                component = "logging_driver",
                op = op.as_str(),
                "Wrapped connection lacks fast path, skipping"
            );
            Err(DriverError::Skip)
        }
    }
}

#[async_trait]
impl Conn for LoggingConn {
    /// The decorator intercepts every fast path, supported or not.
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn prepare(&mut self, query: &str) -> Result<Statement> {
        self.inner.prepare(query).await
    }

    async fn exec_statement(
        &mut self,
        stmt: &Statement,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.inner.exec_statement(stmt, args).await
    }

    async fn query_statement(&mut self, stmt: &Statement, args: &[NamedValue]) -> Result<Rows> {
        self.inner.query_statement(stmt, args).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.inner.ping().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    async fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult> {
        // Calls without a context carry no correlation id.
        self.log(
            &RequestContext::background(),
            Operation::Exec,
            query,
            Args::Positional(args),
        );
        self.check(Operation::Exec)?;
        self.inner.exec(query, args).await
    }

    async fn exec_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.log(ctx, Operation::ExecContext, query, Args::Named(args));
        self.check(Operation::ExecContext)?;
        self.inner.exec_context(ctx, query, args).await
    }

    async fn query(&mut self, query: &str, args: &[Value]) -> Result<Rows> {
        self.log(
            &RequestContext::background(),
            Operation::Query,
            query,
            Args::Positional(args),
        );
        self.check(Operation::Query)?;
        self.inner.query(query, args).await
    }

    async fn query_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Rows> {
        self.log(ctx, Operation::QueryContext, query, Args::Named(args));
        self.check(Operation::QueryContext)?;
        self.inner.query_context(ctx, query, args).await
    }
}
