//! `PostgreSQL` Engine Adapter
//!
//! This module implements the `EngineAdapter` trait for `PostgreSQL` databases.
//!
//! # Features
//! - Client-server connections via TCP
//! - Schema enumeration via `information_schema` (system schemas excluded)
//! - Rich type system support (arrays, JSON/JSONB, NUMERIC, timestamps, etc.)
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Every call opens a session and closes it before returning, on success and failure
//! - JSON/JSONB preserved as nested JSON
//! - NUMERIC rendered as an exact decimal string
//! - BYTEA data is Base64-encoded for JSON safety
//! - Types without a dedicated mapping fall back to text, or Base64 when not UTF-8

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::engine::{
    assemble_tables, ColumnMetadata, ConnectionDescriptor, EngineAdapter, QueryResult,
    SqlDialect, TableMetadata, ENGINE_POSTGRESQL,
};
use crate::error::{GatewayError, Result};

/// Upper bound for establishing a TCP + auth handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `PostgreSQL` engine adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresAdapter;

#[async_trait]
impl EngineAdapter for PostgresAdapter {
    fn engine_id(&self) -> &'static str {
        ENGINE_POSTGRESQL
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn default_schema(&self) -> &'static str {
        "public"
    }

    async fn test_connectivity(&self, descriptor: &ConnectionDescriptor) -> bool {
        match PgSession::open(descriptor).await {
            Ok(session) => {
                session.close().await;
                true
            }
            Err(e) => {
                tracing::debug!(url = %descriptor.redacted_url(), error = %e, "postgres connectivity check failed");
                false
            }
        }
    }

    async fn run_query(&self, descriptor: &ConnectionDescriptor, sql: &str) -> Result<QueryResult> {
        let session = PgSession::open(descriptor).await.map_err(|e| {
            GatewayError::query_execution(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        let result = execute_query(&session.client, sql).await;
        session.close().await;
        result
    }

    async fn list_schema_objects(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<TableMetadata>> {
        let session = PgSession::open(descriptor).await.map_err(|e| {
            GatewayError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        let result = enumerate_schema(&session.client).await;
        session.close().await;
        result
    }

    async fn list_columns(
        &self,
        descriptor: &ConnectionDescriptor,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let session = PgSession::open(descriptor).await.map_err(|e| {
            GatewayError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        let result = table_columns(&session.client, schema, table).await;
        session.close().await;
        result
    }
}

/// One client plus the task driving its socket
struct PgSession {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgSession {
    async fn open(descriptor: &ConnectionDescriptor) -> std::result::Result<Self, tokio_postgres::Error> {
        let (client, connection) = build_pg_config(descriptor).connect(NoTls).await?;

        // Connection errors are logged without the URL to avoid leaking credentials
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "postgres connection terminated with error");
            }
        });

        Ok(Self { client, driver })
    }

    /// Dropping the last client makes the driver send Terminate and exit
    async fn close(self) {
        drop(self.client);
        if let Err(e) = self.driver.await {
            tracing::debug!(error = %e, "postgres connection task did not shut down cleanly");
        }
    }
}

/// Build `PostgreSQL` connection config from a descriptor
fn build_pg_config(descriptor: &ConnectionDescriptor) -> Config {
    let mut pg_config = Config::new();
    pg_config
        .host(&descriptor.host)
        .port(descriptor.port)
        .user(&descriptor.user)
        .connect_timeout(CONNECT_TIMEOUT);

    if !descriptor.password.is_empty() {
        pg_config.password(&descriptor.password);
    }
    if let Some(database) = &descriptor.database {
        pg_config.dbname(database);
    }

    pg_config
}

const TABLES_QUERY: &str = "
    SELECT table_schema::text, table_name::text, table_type::text
    FROM information_schema.tables
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name";

const COLUMNS_QUERY: &str = "
    SELECT table_schema::text, table_name::text, column_name::text, data_type::text,
           is_nullable::text, column_default::text, ordinal_position::int4
    FROM information_schema.columns
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name, ordinal_position";

const TABLE_COLUMNS_QUERY: &str = "
    SELECT table_schema::text, table_name::text, column_name::text, data_type::text,
           is_nullable::text, column_default::text, ordinal_position::int4
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position";

/// Enumerate every user table/view with its columns (two round trips)
async fn enumerate_schema(client: &Client) -> Result<Vec<TableMetadata>> {
    let table_rows = client.query(TABLES_QUERY, &[]).await.map_err(|e| {
        GatewayError::engine_error(ENGINE_POSTGRESQL, format!("Failed to list tables: {e}"))
    })?;

    let column_rows = client.query(COLUMNS_QUERY, &[]).await.map_err(|e| {
        GatewayError::engine_error(ENGINE_POSTGRESQL, format!("Failed to list columns: {e}"))
    })?;

    let tables = table_rows.iter().map(|row| (row.get(0), row.get(1), row.get(2))).collect();

    let columns = column_rows
        .iter()
        .map(|row| (row.get(0), row.get(1), column_from_row(row)))
        .collect();

    Ok(assemble_tables(tables, columns))
}

async fn table_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>> {
    let rows = client.query(TABLE_COLUMNS_QUERY, &[&schema, &table]).await.map_err(|e| {
        GatewayError::engine_error(
            ENGINE_POSTGRESQL,
            format!("Failed to query columns for {schema}.{table}: {e}"),
        )
    })?;

    Ok(rows.iter().map(column_from_row).collect())
}

/// Columns 2..=6 of the column queries above
fn column_from_row(row: &Row) -> ColumnMetadata {
    let is_nullable: String = row.get(4);
    ColumnMetadata {
        name: row.get(2),
        data_type: row.get(3),
        nullable: is_nullable == "YES",
        default_expr: row.get(5),
        ordinal_position: i64::from(row.get::<_, i32>(6)),
    }
}

async fn execute_query(client: &Client, sql: &str) -> Result<QueryResult> {
    let stmt = client
        .prepare(sql)
        .await
        .map_err(|e| GatewayError::query_execution(format!("Failed to prepare query: {e}")))?;

    let rows = client
        .query(&stmt, &[])
        .await
        .map_err(|e| GatewayError::query_execution(format!("Failed to execute query: {e}")))?;

    let column_names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

    let mut rows_data = Vec::with_capacity(rows.len());
    for row in &rows {
        rows_data.push(row_to_json(row)?);
    }

    Ok(QueryResult::new(column_names, rows_data))
}

/// Convert a `PostgreSQL` row to a JSON-safe `Vec`
fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| postgres_value_to_json(row, idx)).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        GatewayError::query_execution(format!(
            "Failed to read column '{}' of type {}: {e}",
            row.columns()[idx].name(),
            row.columns()[idx].type_()
        ))
    })
}

fn float_to_json(v: f64) -> serde_json::Value {
    // NaN/Infinity have no JSON representation
    serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn array_to_json<T>(values: Vec<Option<T>>, convert: impl Fn(T) -> serde_json::Value) -> serde_json::Value {
    serde_json::Value::Array(
        values.into_iter().map(|v| v.map_or(serde_json::Value::Null, &convert)).collect(),
    )
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use serde_json::Value;

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| float_to_json(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float_to_json),
        Type::NUMERIC => get::<PgNumeric>(row, idx)?.map(|n| Value::String(n.0)),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx)?.map(Value::String)
        }

        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,

        Type::BYTEA => get::<Vec<u8>>(row, idx)?
            .map(|v| Value::String(base64::engine::general_purpose::STANDARD.encode(v))),

        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339()))
        }
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
        Type::TIME => get::<chrono::NaiveTime>(row, idx)?
            .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string())),

        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),

        Type::BOOL_ARRAY => get::<Vec<Option<bool>>>(row, idx)?.map(|v| array_to_json(v, Value::Bool)),
        Type::INT2_ARRAY => get::<Vec<Option<i16>>>(row, idx)?.map(|v| array_to_json(v, Value::from)),
        Type::INT4_ARRAY => get::<Vec<Option<i32>>>(row, idx)?.map(|v| array_to_json(v, Value::from)),
        Type::INT8_ARRAY => get::<Vec<Option<i64>>>(row, idx)?.map(|v| array_to_json(v, Value::from)),
        Type::FLOAT8_ARRAY => get::<Vec<Option<f64>>>(row, idx)?.map(|v| array_to_json(v, float_to_json)),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
            get::<Vec<Option<String>>>(row, idx)?.map(|v| array_to_json(v, Value::String))
        }

        _ => get::<PgRaw>(row, idx)?.map(PgRaw::into_json),
    };

    Ok(value.unwrap_or(Value::Null))
}

/// NUMERIC decoded from its binary wire format into an exact decimal string
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits` base-10000 digits.
/// `weight` is the power of 10000 of the first digit.
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, Box<dyn std::error::Error + Sync + Send>> {
    use std::fmt::Write as _;

    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }
    let ndigits = usize::from(u16::from_be_bytes([raw[0], raw[1]]));
    let weight = i32::from(i16::from_be_bytes([raw[2], raw[3]]));
    let sign = u16::from_be_bytes([raw[4], raw[5]]);
    let dscale = usize::from(u16::from_be_bytes([raw[6], raw[7]]));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    if raw.len() != 8 + ndigits * 2 {
        return Err("numeric value has inconsistent length".into());
    }
    let digits: Vec<u16> =
        raw[8..].chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
    let digit_at = |i: i32| usize::try_from(i).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0);

    let mut out = String::new();
    if sign == NUMERIC_NEG && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit_at(i))?;
            } else {
                write!(out, "{:04}", digit_at(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut i = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit_at(i))?;
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Any other type, read from its raw wire bytes
struct PgRaw(Vec<u8>);

impl PgRaw {
    /// Text-like payloads (enums, citext, ...) become strings; anything else is Base64
    fn into_json(self) -> serde_json::Value {
        match String::from_utf8(self.0) {
            Ok(text) if !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') => {
                serde_json::Value::String(text)
            }
            Ok(text) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(text.into_bytes()),
            ),
            Err(e) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
            ),
        }
    }
}

impl<'a> FromSql<'a> for PgRaw {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
