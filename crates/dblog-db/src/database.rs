//! Caller-facing database handle.
//!
//! [`Database`] owns one connection opened through a registered driver. Each
//! call tries the connection's fast path first; when the connection answers
//! with [`DriverError::Skip`], the call is retried through prepare + execute.
//! Any other error is returned unchanged.
//!
//! A connection-level failure (see [`DriverError::is_bad_connection`]) drops
//! the connection. The failed call is not repeated; the next call reopens
//! through the same driver and DSN.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dblog_core::{NamedValue, RequestContext, Value};

use crate::driver::{Conn, Driver, ExecResult, Rows};
use crate::error::{DriverError, Result};
use crate::registry::DriverRegistry;

/// Where replacement connections come from.
struct Source {
    driver: Arc<dyn Driver>,
    dsn: String,
}

struct ConnState {
    conn: Option<Box<dyn Conn>>,
    closed: bool,
}

/// A database opened by driver name.
pub struct Database {
    driver_name: String,
    source: Option<Source>,
    state: Mutex<ConnState>,
}

impl Database {
    /// Open `dsn` with the driver registered as `driver_name`.
    pub async fn open(registry: &DriverRegistry, driver_name: &str, dsn: &str) -> Result<Self> {
        let driver = registry.get(driver_name)?;
        let conn = driver.open(dsn).await?;
        let mut db = Self::from_conn(driver_name, conn);
        db.source = Some(Source {
            driver,
            dsn: dsn.to_string(),
        });
        Ok(db)
    }

    /// Wrap an already open connection. Without a driver to reopen through,
    /// a connection-level failure leaves the handle closed.
    pub fn from_conn(driver_name: impl Into<String>, conn: Box<dyn Conn>) -> Self {
        Self {
            driver_name: driver_name.into(),
            source: None,
            state: Mutex::new(ConnState {
                conn: Some(conn),
                closed: false,
            }),
        }
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Execute a statement outside any request.
    pub async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        self.exec_with(&RequestContext::background(), query, args)
            .await
    }

    /// Execute a statement on behalf of `ctx`.
    pub async fn exec_with(
        &self,
        ctx: &RequestContext,
        query: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        let mut state = self.state.lock().await;
        let conn = self.acquire(&mut state).await?;
        let result = self.exec_on(&mut **conn, ctx, query, args).await;
        self.settle(&mut state, result)
    }

    /// Run a query outside any request.
    pub async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        self.query_with(&RequestContext::background(), query, args)
            .await
    }

    /// Run a query on behalf of `ctx`.
    pub async fn query_with(
        &self,
        ctx: &RequestContext,
        query: &str,
        args: &[Value],
    ) -> Result<Rows> {
        let mut state = self.state.lock().await;
        let conn = self.acquire(&mut state).await?;
        let result = self.query_on(&mut **conn, ctx, query, args).await;
        self.settle(&mut state, result)
    }

    /// First row of a query, or `None` when it returns no rows.
    pub async fn query_row_with(
        &self,
        ctx: &RequestContext,
        query: &str,
        args: &[Value],
    ) -> Result<Option<Vec<Value>>> {
        let rows = self.query_with(ctx, query, args).await?;
        Ok(rows.rows.into_iter().next())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let conn = self.acquire(&mut state).await?;
        let result = conn.ping().await;
        self.settle(&mut state, result)
    }

    /// Close the connection. Every later call fails with
    /// [`DriverError::ConnClosed`].
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        match state.conn.take() {
            Some(mut conn) => conn.close().await,
            None => Ok(()),
        }
    }

    async fn exec_on(
        &self,
        conn: &mut dyn Conn,
        ctx: &RequestContext,
        query: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        let named = NamedValue::from_positional(args);
        let caps = conn.capabilities();

        if caps.exec_context {
            match conn.exec_context(ctx, query, &named).await {
                Err(DriverError::Skip) => self.log_fallback("exec_context"),
                other => return other,
            }
        } else if caps.exec {
            match conn.exec(query, args).await {
                Err(DriverError::Skip) => self.log_fallback("exec"),
                other => return other,
            }
        }

        let stmt = conn.prepare(query).await?;
        stmt.check_args(named.len())?;
        conn.exec_statement(&stmt, &named).await
    }

    async fn query_on(
        &self,
        conn: &mut dyn Conn,
        ctx: &RequestContext,
        query: &str,
        args: &[Value],
    ) -> Result<Rows> {
        let named = NamedValue::from_positional(args);
        let caps = conn.capabilities();

        if caps.query_context {
            match conn.query_context(ctx, query, &named).await {
                Err(DriverError::Skip) => self.log_fallback("query_context"),
                other => return other,
            }
        } else if caps.query {
            match conn.query(query, args).await {
                Err(DriverError::Skip) => self.log_fallback("query"),
                other => return other,
            }
        }

        let stmt = conn.prepare(query).await?;
        stmt.check_args(named.len())?;
        conn.query_statement(&stmt, &named).await
    }

    /// The live connection, reopening it if a previous call dropped it.
    async fn acquire<'a>(&self, state: &'a mut ConnState) -> Result<&'a mut Box<dyn Conn>> {
        if state.closed {
            return Err(DriverError::ConnClosed);
        }
        if state.conn.is_none() {
            let source = self.source.as_ref().ok_or(DriverError::ConnClosed)?;
            let conn = source.driver.open(&source.dsn).await?;
            info!(
                subsystem = "db",
                component = "database",
                op = "reopen",
                driver = %self.driver_name,
                "Connection reopened"
            );
            state.conn = Some(conn);
        }
        state.conn.as_mut().ok_or(DriverError::ConnClosed)
    }

    /// Drop the connection when `result` says it is unusable.
    fn settle<T>(&self, state: &mut ConnState, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_bad_connection() && state.conn.take().is_some() {
                warn!(
                    subsystem = "db",
                    component = "database",
                    op = "discard",
                    driver = %self.driver_name,
                    error = %err,
                    "Connection failed, discarding it"
                );
            }
        }
        result
    }

    fn log_fallback(&self, fast_path: &str) {
        debug!(
            subsystem = "db",
            component = "database",
            op = "fallback",
            driver = %self.driver_name,
            fast_path,
            "Connection skipped fast path, using prepared statement"
        );
    }
}
