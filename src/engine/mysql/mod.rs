//! MySQL Engine Adapter
//!
//! This module implements the `EngineAdapter` trait for MySQL databases (including MariaDB).
//!
//! # Features
//! - Client-server connections via TCP
//! - Schema enumeration via information_schema
//!   (`information_schema`, `performance_schema`, `mysql` and `sys` are excluded)
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Queries run over the binary protocol so values arrive typed
//! - DECIMAL, ENUM and SET values are strings
//! - BLOB data is Base64-encoded for JSON safety
//! - There is no schema layer below the database: a table's schema is its database name

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, OptsBuilder, Row, Value};

use crate::engine::{
    assemble_tables, ColumnMetadata, ConnectionDescriptor, EngineAdapter, QueryResult,
    SqlDialect, TableMetadata, ENGINE_MYSQL,
};
use crate::error::{GatewayError, Result};

/// Upper bound for establishing a TCP + auth handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User assumed when the URL carries none
const DEFAULT_USER: &str = "root";

/// Character set id MySQL reports for binary strings
const BINARY_CHARSET: u16 = 63;

/// MySQL engine adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlAdapter;

#[async_trait]
impl EngineAdapter for MySqlAdapter {
    fn engine_id(&self) -> &'static str {
        ENGINE_MYSQL
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    fn default_schema(&self) -> &'static str {
        ""
    }

    async fn test_connectivity(&self, descriptor: &ConnectionDescriptor) -> bool {
        match connect(descriptor).await {
            Ok(conn) => {
                disconnect(conn).await;
                true
            }
            Err(e) => {
                tracing::debug!(url = %descriptor.redacted_url(), error = %e, "mysql connectivity check failed");
                false
            }
        }
    }

    async fn run_query(&self, descriptor: &ConnectionDescriptor, sql: &str) -> Result<QueryResult> {
        let mut conn = connect(descriptor)
            .await
            .map_err(|e| GatewayError::query_execution(format!("Failed to connect to MySQL: {e}")))?;

        let result = execute_query(&mut conn, sql).await;
        disconnect(conn).await;
        result
    }

    async fn list_schema_objects(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<TableMetadata>> {
        let mut conn = connect(descriptor)
            .await
            .map_err(|e| GatewayError::connection_failed(format!("Failed to connect to MySQL: {e}")))?;

        let result = enumerate_schema(&mut conn).await;
        disconnect(conn).await;
        result
    }

    async fn list_columns(
        &self,
        descriptor: &ConnectionDescriptor,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let mut conn = connect(descriptor)
            .await
            .map_err(|e| GatewayError::connection_failed(format!("Failed to connect to MySQL: {e}")))?;

        let result = table_columns(&mut conn, schema, table).await;
        disconnect(conn).await;
        result
    }
}

/// Build MySQL connection options from a descriptor
fn build_mysql_opts(descriptor: &ConnectionDescriptor) -> OptsBuilder {
    let user = if descriptor.user.is_empty() { DEFAULT_USER } else { descriptor.user.as_str() };

    OptsBuilder::default()
        .ip_or_hostname(descriptor.host.clone())
        .tcp_port(descriptor.port)
        .user(Some(user))
        .pass(Some(descriptor.password.clone()))
        .db_name(descriptor.database.clone())
}

async fn connect(descriptor: &ConnectionDescriptor) -> std::result::Result<Conn, String> {
    match tokio::time::timeout(CONNECT_TIMEOUT, Conn::new(build_mysql_opts(descriptor))).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {}s", CONNECT_TIMEOUT.as_secs())),
    }
}

async fn disconnect(conn: Conn) {
    if let Err(e) = conn.disconnect().await {
        tracing::debug!(error = %e, "mysql disconnect failed");
    }
}

const TABLES_QUERY: &str = "
    SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys')
    ORDER BY TABLE_SCHEMA, TABLE_NAME";

const COLUMNS_QUERY: &str = "
    SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT,
           CAST(ORDINAL_POSITION AS SIGNED)
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys')
    ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION";

const TABLE_COLUMNS_QUERY: &str = "
    SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT,
           CAST(ORDINAL_POSITION AS SIGNED)
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION";

/// Enumerate every user table/view with its columns (two round trips)
async fn enumerate_schema(conn: &mut Conn) -> Result<Vec<TableMetadata>> {
    let table_rows: Vec<Row> = conn.query(TABLES_QUERY).await.map_err(|e| {
        GatewayError::engine_error(ENGINE_MYSQL, format!("Failed to list tables: {e}"))
    })?;

    let column_rows: Vec<Row> = conn.query(COLUMNS_QUERY).await.map_err(|e| {
        GatewayError::engine_error(ENGINE_MYSQL, format!("Failed to list columns: {e}"))
    })?;

    let mut tables = Vec::with_capacity(table_rows.len());
    for row in &table_rows {
        tables.push((required_text(row, 0)?, required_text(row, 1)?, required_text(row, 2)?));
    }

    let mut columns = Vec::with_capacity(column_rows.len());
    for row in &column_rows {
        columns.push((required_text(row, 0)?, required_text(row, 1)?, column_from_row(row)?));
    }

    Ok(assemble_tables(tables, columns))
}

async fn table_columns(conn: &mut Conn, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>> {
    let rows: Vec<Row> = conn.exec(TABLE_COLUMNS_QUERY, (schema, table)).await.map_err(|e| {
        GatewayError::engine_error(
            ENGINE_MYSQL,
            format!("Failed to query columns for {schema}.{table}: {e}"),
        )
    })?;

    rows.iter().map(column_from_row).collect()
}

/// Columns 2..=6 of the column queries above
fn column_from_row(row: &Row) -> Result<ColumnMetadata> {
    let ordinal = match row.get_opt::<i64, usize>(6) {
        Some(Ok(position)) => position,
        _ => {
            return Err(GatewayError::engine_error(ENGINE_MYSQL, "Unreadable ORDINAL_POSITION"));
        }
    };

    Ok(ColumnMetadata {
        name: required_text(row, 2)?,
        data_type: required_text(row, 3)?,
        nullable: required_text(row, 4)? == "YES",
        default_expr: optional_text(row, 5)?,
        ordinal_position: ordinal,
    })
}

fn optional_text(row: &Row, idx: usize) -> Result<Option<String>> {
    match row.get_opt::<Option<String>, usize>(idx) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(GatewayError::engine_error(
            ENGINE_MYSQL,
            format!("Failed to read metadata column {idx}: {e}"),
        )),
        None => Ok(None),
    }
}

fn required_text(row: &Row, idx: usize) -> Result<String> {
    optional_text(row, idx)?.ok_or_else(|| {
        GatewayError::engine_error(ENGINE_MYSQL, format!("Metadata column {idx} is NULL"))
    })
}

async fn execute_query(conn: &mut Conn, sql: &str) -> Result<QueryResult> {
    let rows: Vec<Row> = conn
        .exec(sql, ())
        .await
        .map_err(|e| GatewayError::query_execution(format!("Failed to execute query: {e}")))?;

    let column_names: Vec<String> = rows
        .first()
        .map(|row| row.columns_ref().iter().map(|c| c.name_str().to_string()).collect())
        .unwrap_or_default();

    let mut rows_data = Vec::with_capacity(rows.len());
    for row in &rows {
        rows_data.push(row_to_json(row)?);
    }

    Ok(QueryResult::new(column_names, rows_data))
}

/// Convert a MySQL row to a JSON-safe `Vec`
fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| mysql_value_to_json(row, idx)).collect()
}

fn float_to_json(v: f64) -> serde_json::Value {
    // NaN/Infinity have no JSON representation
    serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row.as_ref(idx).ok_or_else(|| {
        GatewayError::query_execution(format!("Failed to get value at index {idx}"))
    })?;
    let column = &row.columns_ref()[idx];

    let json_value = match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => bytes_to_json(bytes, column.character_set() == BINARY_CHARSET),

        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),
        Value::Float(f) => float_to_json(f64::from(*f)),
        Value::Double(d) => float_to_json(*d),

        Value::Date(year, month, day, hour, minute, second, micro) => {
            let rendered = if column.column_type() == ColumnType::MYSQL_TYPE_DATE {
                format!("{year:04}-{month:02}-{day:02}")
            } else if *micro == 0 {
                format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}")
            } else {
                format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}")
            };
            serde_json::Value::String(rendered)
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micro) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            let rendered = if *micro == 0 {
                format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micro:06}")
            };
            serde_json::Value::String(rendered)
        }
    };

    Ok(json_value)
}

/// Text columns become strings; binary columns (and invalid UTF-8) become Base64
fn bytes_to_json(bytes: &[u8], binary: bool) -> serde_json::Value {
    match std::str::from_utf8(bytes) {
        Ok(text) if !binary => serde_json::Value::String(text.to_string()),
        _ => serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}
