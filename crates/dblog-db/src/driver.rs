//! Driver and connection capability surface.
//!
//! A [`Conn`] must support the generic prepare-then-execute path. The four
//! direct exec/query methods are optional fast paths: a connection states
//! which ones it implements through [`Capabilities`], and the defaults return
//! [`DriverError::Skip`].

use async_trait::async_trait;
use serde::Serialize;

use dblog_core::{NamedValue, RequestContext, Value};

use crate::error::{DriverError, Result};

/// The intercepted call kinds, named as they appear in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exec,
    ExecContext,
    Query,
    QueryContext,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Exec => "Exec",
            Operation::ExecContext => "ExecContext",
            Operation::Query => "Query",
            Operation::QueryContext => "QueryContext",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional fast paths a connection implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub exec: bool,
    pub exec_context: bool,
    pub query: bool,
    pub query_context: bool,
}

impl Capabilities {
    /// Only the prepared-statement path.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every fast path.
    pub fn all() -> Self {
        Self {
            exec: true,
            exec_context: true,
            query: true,
            query_context: true,
        }
    }

    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::Exec => self.exec,
            Operation::ExecContext => self.exec_context,
            Operation::Query => self.query,
            Operation::QueryContext => self.query_context,
        }
    }

    /// Set support for one operation.
    pub fn with(mut self, op: Operation, supported: bool) -> Self {
        match op {
            Operation::Exec => self.exec = supported,
            Operation::ExecContext => self.exec_context = supported,
            Operation::Query => self.query = supported,
            Operation::QueryContext => self.query_context = supported,
        }
        self
    }
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// A fully materialized result set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of column `name` in row `row`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(|v| serde_json::to_value(v).unwrap_or_default()))
                    .collect()
            })
            .collect()
    }
}

/// A statement prepared on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    query: String,
    num_input: Option<usize>,
    columns: Vec<String>,
}

impl Statement {
    /// `num_input` is `None` when the driver cannot tell the parameter count.
    pub fn new(query: impl Into<String>, num_input: Option<usize>, columns: Vec<String>) -> Self {
        Self {
            query: query.into(),
            num_input,
            columns,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn num_input(&self) -> Option<usize> {
        self.num_input
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Reject argument lists whose length disagrees with the parameter count.
    pub fn check_args(&self, got: usize) -> Result<()> {
        match self.num_input {
            Some(expected) if expected != got => Err(DriverError::ArgumentCount { expected, got }),
            _ => Ok(()),
        }
    }
}

/// Opens connections from a data source name.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open(&self, dsn: &str) -> Result<Box<dyn Conn>>;
}

/// A single database connection.
#[async_trait]
pub trait Conn: Send {
    /// Fast paths this connection implements.
    fn capabilities(&self) -> Capabilities;

    /// Prepare a statement for [`Conn::exec_statement`] / [`Conn::query_statement`].
    async fn prepare(&mut self, query: &str) -> Result<Statement>;

    async fn exec_statement(&mut self, stmt: &Statement, args: &[NamedValue])
        -> Result<ExecResult>;

    async fn query_statement(&mut self, stmt: &Statement, args: &[NamedValue]) -> Result<Rows>;

    /// Verify the connection is still alive.
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the connection; later calls fail with `ConnClosed`.
    async fn close(&mut self) -> Result<()>;

    async fn exec(&mut self, _query: &str, _args: &[Value]) -> Result<ExecResult> {
        Err(DriverError::Skip)
    }

    async fn exec_context(
        &mut self,
        _ctx: &RequestContext,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<ExecResult> {
        Err(DriverError::Skip)
    }

    async fn query(&mut self, _query: &str, _args: &[Value]) -> Result<Rows> {
        Err(DriverError::Skip)
    }

    async fn query_context(
        &mut self,
        _ctx: &RequestContext,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<Rows> {
        Err(DriverError::Skip)
    }
}
