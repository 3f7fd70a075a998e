//! PostgreSQL driver built on sqlx.
//!
//! [`PgConn`] implements every fast path. Each statement is described first
//! (sqlx caches the server-side prepared statement), and every argument is
//! converted to the parameter type the server inferred for it, so `$1`
//! compared against an `int4` column binds as `int4` and a text argument for
//! a `uuid` parameter is parsed into a UUID. Arguments are bound positionally
//! in ordinal order; named values only contribute their value.
//!
//! Result columns are decoded into [`Value`]s by Postgres type name. A
//! non-NULL column of a type without a mapping is an error, never a silent
//! `Value::Null`.

use std::future::Future;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{
    Column, Connection, Either, Executor, Postgres, Row, Statement as _, TypeInfo, ValueRef,
};
use tracing::{info, trace};

use dblog_core::{NamedValue, RequestContext, Value};

use crate::driver::{Capabilities, Conn, Driver, ExecResult, Rows, Statement};
use crate::error::{DriverError, Result};

/// Opens plain sqlx PostgreSQL connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl PgDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn open(&self, dsn: &str) -> Result<Box<dyn Conn>> {
        let start = Instant::now();
        let conn = PgConnection::connect(dsn).await?;

        info!(
            subsystem = "db",
            component = "postgres",
            op = "open",
            duration_ms = start.elapsed().as_millis() as u64,
            "PostgreSQL connection established"
        );

        Ok(Box::new(PgConn::new(conn)))
    }
}

/// A single PostgreSQL connection.
pub struct PgConn {
    conn: Option<PgConnection>,
}

impl PgConn {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn_mut(&mut self) -> Result<&mut PgConnection> {
        self.conn.as_mut().ok_or(DriverError::ConnClosed)
    }

    async fn execute(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        let conn = self.conn_mut()?;
        with_deadline(ctx, async move {
            let described = describe(&mut *conn, query).await?;
            let done = bind_args(sqlx::query(query), args, &described.param_types)?
                .execute(&mut *conn)
                .await?;
            Ok(ExecResult {
                rows_affected: done.rows_affected(),
            })
        })
        .await
    }

    async fn fetch(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Rows> {
        let conn = self.conn_mut()?;
        with_deadline(ctx, async move {
            let described = describe(&mut *conn, query).await?;
            let pg_rows = bind_args(sqlx::query(query), args, &described.param_types)?
                .fetch_all(&mut *conn)
                .await?;
            let rows = pg_rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
            Ok(Rows::new(described.columns, rows))
        })
        .await
    }
}

#[async_trait]
impl Conn for PgConn {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn prepare(&mut self, query: &str) -> Result<Statement> {
        let described = describe(self.conn_mut()?, query).await?;
        Ok(Statement::new(
            query,
            Some(described.param_types.len()),
            described.columns,
        ))
    }

    async fn exec_statement(
        &mut self,
        stmt: &Statement,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        stmt.check_args(args.len())?;
        self.execute(&RequestContext::background(), stmt.query(), args)
            .await
    }

    async fn query_statement(&mut self, stmt: &Statement, args: &[NamedValue]) -> Result<Rows> {
        stmt.check_args(args.len())?;
        self.fetch(&RequestContext::background(), stmt.query(), args)
            .await
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn_mut()?.ping().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }

    async fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult> {
        let args = NamedValue::from_positional(args);
        self.execute(&RequestContext::background(), query, &args)
            .await
    }

    async fn exec_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.execute(ctx, query, args).await
    }

    async fn query(&mut self, query: &str, args: &[Value]) -> Result<Rows> {
        let args = NamedValue::from_positional(args);
        self.fetch(&RequestContext::background(), query, &args)
            .await
    }

    async fn query_context(
        &mut self,
        ctx: &RequestContext,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Rows> {
        self.fetch(ctx, query, args).await
    }
}

/// Parameter and result shape of a prepared statement.
struct Described {
    /// Postgres type name per parameter; empty when the server did not say.
    param_types: Vec<String>,
    columns: Vec<String>,
}

async fn describe(conn: &mut PgConnection, query: &str) -> Result<Described> {
    let stmt = (&mut *conn).prepare(query).await?;
    let param_types = match stmt.parameters() {
        Some(Either::Left(types)) => types.iter().map(|t| t.name().to_string()).collect(),
        Some(Either::Right(n)) => vec![String::new(); n],
        None => Vec::new(),
    };
    let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    Ok(Described {
        param_types,
        columns,
    })
}

async fn with_deadline<T, F>(ctx: &RequestContext, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| DriverError::DeadlineExceeded)?,
        None => fut.await,
    }
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_args<'q>(
    mut query: PgQuery<'q>,
    args: &[NamedValue],
    param_types: &[String],
) -> Result<PgQuery<'q>> {
    if args.len() != param_types.len() {
        return Err(DriverError::ArgumentCount {
            expected: param_types.len(),
            got: args.len(),
        });
    }

    let mut ordered: Vec<&NamedValue> = args.iter().collect();
    ordered.sort_by_key(|a| a.ordinal);

    for (arg, pg_type) in ordered.into_iter().zip(param_types) {
        let param = Param {
            ordinal: arg.ordinal,
            pg_type,
        };
        query = bind_arg(query, &param, &arg.value)?;
    }
    Ok(query)
}

/// The parameter slot an argument is being converted for.
struct Param<'a> {
    ordinal: usize,
    pg_type: &'a str,
}

impl Param<'_> {
    fn invalid(&self, reason: impl ToString) -> DriverError {
        DriverError::InvalidArgument {
            ordinal: self.ordinal,
            pg_type: self.pg_type.to_string(),
            reason: reason.to_string(),
        }
    }

    fn mismatch(&self, value: &Value) -> DriverError {
        self.invalid(format!("incompatible value {:?}", value))
    }
}

fn bind_arg<'q>(query: PgQuery<'q>, param: &Param<'_>, value: &Value) -> Result<PgQuery<'q>> {
    let query = match param.pg_type {
        "BOOL" => query.bind(bool_param(param, value)?),
        "INT2" => query.bind(int_param::<i16>(param, value)?),
        "INT4" => query.bind(int_param::<i32>(param, value)?),
        "INT8" => query.bind(int_param::<i64>(param, value)?),
        "FLOAT4" => query.bind(float_param(param, value)?.map(|x| x as f32)),
        "FLOAT8" => query.bind(float_param(param, value)?),
        "NUMERIC" => query.bind(numeric_param(param, value)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => query.bind(text_param(param, value)?),
        "BYTEA" => query.bind(bytes_param(param, value)?),
        "UUID" => query.bind(uuid_param(param, value)?),
        "JSON" | "JSONB" => query.bind(json_param(param, value)?),
        "TIMESTAMPTZ" => query.bind(timestamptz_param(param, value)?),
        "TIMESTAMP" => query.bind(timestamptz_param(param, value)?.map(|ts| ts.naive_utc())),
        "DATE" => query.bind(date_param(param, value)?),
        "BOOL[]" => query.bind(array_param(param, value, bool_param)?),
        "INT2[]" => query.bind(array_param(param, value, int_param::<i16>)?),
        "INT4[]" => query.bind(array_param(param, value, int_param::<i32>)?),
        "INT8[]" => query.bind(array_param(param, value, int_param::<i64>)?),
        "FLOAT8[]" => query.bind(array_param(param, value, float_param)?),
        "TEXT[]" | "VARCHAR[]" => query.bind(array_param(param, value, text_param)?),
        "UUID[]" => query.bind(array_param(param, value, uuid_param)?),
        // Server did not report a type; bind by the value's own shape.
        "" => bind_natural(query, value),
        // A NULL carries no payload, so any declared type accepts it.
        _ if value.is_null() => query.bind(None::<String>),
        other => return Err(param.invalid(format!("unsupported parameter type {}", other))),
    };
    Ok(query)
}

fn bind_natural<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(n) => query.bind(*n),
        Value::Float(x) => query.bind(*x),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(bytes) => query.bind(bytes.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Array(items) => query.bind(items.iter().map(|v| v.to_string()).collect::<Vec<_>>()),
    }
}

fn bool_param(param: &Param<'_>, value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Text(s) => s.parse().map(Some).map_err(|e| param.invalid(e)),
        other => Err(param.mismatch(other)),
    }
}

fn int_param<T>(param: &Param<'_>, value: &Value) -> Result<Option<T>>
where
    T: TryFrom<i64>,
{
    if value.is_null() {
        return Ok(None);
    }
    let n = match value.as_i64() {
        Some(n) => n,
        None => value
            .as_str()
            .ok_or_else(|| param.mismatch(value))?
            .trim()
            .parse::<i64>()
            .map_err(|e| param.invalid(e))?,
    };
    T::try_from(n)
        .map(Some)
        .map_err(|_| param.invalid(format!("{} out of range", n)))
}

fn float_param(param: &Param<'_>, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Float(x) => Ok(Some(*x)),
        Value::Int(n) => Ok(Some(*n as f64)),
        Value::Text(s) => s.trim().parse().map(Some).map_err(|e| param.invalid(e)),
        other => Err(param.mismatch(other)),
    }
}

fn numeric_param(param: &Param<'_>, value: &Value) -> Result<Option<BigDecimal>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Int(n) => return Ok(Some(BigDecimal::from(*n))),
        Value::Float(x) => x.to_string(),
        Value::Text(s) => s.trim().to_string(),
        other => return Err(param.mismatch(other)),
    };
    BigDecimal::from_str(&text)
        .map(Some)
        .map_err(|e| param.invalid(e))
}

fn text_param(param: &Param<'_>, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Bytes(_) | Value::Array(_) => Err(param.mismatch(value)),
        Value::Text(s) => Ok(Some(s.clone())),
        other => Ok(Some(other.to_string())),
    }
}

fn bytes_param(param: &Param<'_>, value: &Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Null => Ok(None),
        Value::Bytes(bytes) => Ok(Some(bytes.clone())),
        Value::Text(s) => Ok(Some(s.as_bytes().to_vec())),
        other => Err(param.mismatch(other)),
    }
}

fn uuid_param(param: &Param<'_>, value: &Value) -> Result<Option<uuid::Uuid>> {
    if value.is_null() {
        return Ok(None);
    }
    let text = value.as_str().ok_or_else(|| param.mismatch(value))?;
    uuid::Uuid::parse_str(text.trim())
        .map(Some)
        .map_err(|e| param.invalid(e))
}

fn json_param(param: &Param<'_>, value: &Value) -> Result<Option<serde_json::Value>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => serde_json::from_str(s).map(Some).map_err(|e| param.invalid(e)),
        other => serde_json::to_value(other)
            .map(Some)
            .map_err(|e| param.invalid(e)),
    }
}

fn timestamptz_param(param: &Param<'_>, value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::Timestamp(ts) => Ok(Some(*ts)),
        Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| param.invalid(e)),
        other => Err(param.mismatch(other)),
    }
}

fn date_param(param: &Param<'_>, value: &Value) -> Result<Option<NaiveDate>> {
    match value {
        Value::Null => Ok(None),
        Value::Timestamp(ts) => Ok(Some(ts.date_naive())),
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| param.invalid(e)),
        other => Err(param.mismatch(other)),
    }
}

fn array_param<T>(
    param: &Param<'_>,
    value: &Value,
    element: fn(&Param<'_>, &Value) -> Result<Option<T>>,
) -> Result<Option<Vec<Option<T>>>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => items
            .iter()
            .map(|item| element(param, item))
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => Err(param.mismatch(other)),
    }
}

fn decode_row(row: &PgRow) -> Result<Vec<Value>> {
    row.columns()
        .iter()
        .map(|col| decode_column(row, col.ordinal(), col.name(), col.type_info().name()))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, name: &str, type_name: &str) -> Result<Value> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(idx)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => Value::Int(row.try_get(idx)?),
        "OID" => Value::Int(row.try_get::<sqlx::postgres::types::Oid, _>(idx)?.0.into()),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => Value::Float(row.try_get(idx)?),
        // Exact decimal text; a float would round.
        "NUMERIC" => Value::Text(row.try_get::<BigDecimal, _>(idx)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::Text(row.try_get(idx)?),
        "BYTEA" => Value::Bytes(row.try_get(idx)?),
        "UUID" => Value::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => Value::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => Value::Timestamp(row.try_get(idx)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?.and_utc()),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "VOID" => Value::Null,
        "BOOL[]" => array(row.try_get::<Vec<Option<bool>>, _>(idx)?, Value::Bool),
        "INT2[]" => array(row.try_get::<Vec<Option<i16>>, _>(idx)?, |n| {
            Value::Int(n.into())
        }),
        "INT4[]" => array(row.try_get::<Vec<Option<i32>>, _>(idx)?, |n| {
            Value::Int(n.into())
        }),
        "INT8[]" => array(row.try_get::<Vec<Option<i64>>, _>(idx)?, Value::Int),
        "FLOAT8[]" => array(row.try_get::<Vec<Option<f64>>, _>(idx)?, Value::Float),
        "TEXT[]" | "VARCHAR[]" => array(row.try_get::<Vec<Option<String>>, _>(idx)?, Value::Text),
        "UUID[]" => array(row.try_get::<Vec<Option<uuid::Uuid>>, _>(idx)?, |id| {
            Value::Text(id.to_string())
        }),
        other => {
            trace!(
                subsystem = "db",
                component = "postgres",
                column = name,
                pg_type = other,
                "No value mapping for column type"
            );
            return Err(DriverError::UnsupportedType {
                column: name.to_string(),
                pg_type: other.to_string(),
            });
        }
    };
    Ok(value)
}

fn array<T>(items: Vec<Option<T>>, wrap: impl Fn(T) -> Value) -> Value {
    Value::Array(
        items
            .into_iter()
            .map(|item| item.map(&wrap).unwrap_or(Value::Null))
            .collect(),
    )
}
