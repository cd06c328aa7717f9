//! Database Engine Traits and Core Types
//!
//! This module defines the core abstractions for database engines.
//! Each engine (`PostgreSQL`, `MySQL`) implements the `EngineAdapter` trait and is
//! resolved by engine identifier through the [`AdapterRegistry`].
//!
//! # Stateless Design
//! All trait methods take `&ConnectionDescriptor` as input and adapters hold no
//! connection-specific state, so one instance per engine serves every connection.
//! Connections are opened, used, and closed within each method call.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! The only shared code is the canonical output shape defined here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

pub mod descriptor;
pub mod registry;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use descriptor::{
    default_port, detect_engine, engine_for_scheme, ConnectionDescriptor, ENGINE_MYSQL,
    ENGINE_POSTGRESQL, ENGINE_UNKNOWN,
};
pub use registry::{AdapterFactory, AdapterRegistry};

/// SQL grammar an adapter declares for parsing and re-rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// `PostgreSQL` grammar
    Postgres,
    /// `MySQL` / `MariaDB` grammar
    MySql,
    /// ANSI-ish fallback for engines without a dedicated grammar
    Generic,
}

impl SqlDialect {
    /// Get the dialect name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Generic => "generic",
        }
    }

    /// Parser dialect understood by `sqlparser`
    #[must_use]
    pub fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{GenericDialect, MySqlDialect, PostgreSqlDialect};

        match self {
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::MySql => Box::new(MySqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Query execution result
///
/// `row_count == rows.len()`, and `columns` is empty exactly when `rows` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,

    /// Result rows, each holding one value per column in column order
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    /// Build a result from materialized rows
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        if rows.is_empty() {
            return Self::empty();
        }
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        let row_count = rows.len();
        Self { columns, rows, row_count }
    }

    /// Result with no rows (and therefore no columns)
    #[must_use]
    pub const fn empty() -> Self {
        Self { columns: Vec::new(), rows: Vec::new(), row_count: 0 }
    }
}

/// Table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    /// Map an `information_schema.tables.table_type` value
    ///
    /// `VIEW` and `SYSTEM VIEW` are views; `BASE TABLE`, `FOREIGN`, temporary tables and
    /// anything else is reported as a table.
    #[must_use]
    pub fn from_table_type(table_type: &str) -> Self {
        if table_type.to_ascii_uppercase().contains("VIEW") {
            Self::View
        } else {
            Self::Table
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

/// Column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,

    /// Column data type (engine-specific spelling)
    pub data_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Default expression (if any)
    pub default_expr: Option<String>,

    /// 1-based position within the table
    #[serde(rename = "position")]
    pub ordinal_position: i64,
}

/// Table or view with its columns, ordered by `ordinal_position`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Schema name (the database name on `MySQL`)
    pub schema: String,

    /// Table name
    pub name: String,

    /// Table or view
    pub kind: TableKind,

    /// Columns in ordinal order; empty for tables without columns
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    /// `schema.name`, with `default_schema` standing in for an empty schema.
    ///
    /// The bare name when both are empty.
    #[must_use]
    pub fn qualified_name(&self, default_schema: &str) -> String {
        let schema = if self.schema.is_empty() { default_schema } else { self.schema.as_str() };
        if schema.is_empty() {
            self.name.clone()
        } else {
            format!("{schema}.{}", self.name)
        }
    }

    #[must_use]
    pub fn summary(&self) -> TableSummary {
        TableSummary { schema: self.schema.clone(), name: self.name.clone(), kind: self.kind }
    }
}

/// Table listing entry without columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
}

/// Group table listings by schema, preserving table order within each schema
#[must_use]
pub fn group_by_schema(tables: Vec<TableSummary>) -> BTreeMap<String, Vec<TableSummary>> {
    let mut grouped: BTreeMap<String, Vec<TableSummary>> = BTreeMap::new();
    for table in tables {
        grouped.entry(table.schema.clone()).or_default().push(table);
    }
    grouped
}

/// Stitch enumerated tables and columns into canonical metadata.
///
/// `tables` carries `(schema, name, table_type)` rows and `columns` carries
/// `(schema, table, column)` rows. Output order follows `tables`; columns are sorted by
/// ordinal position, and tables without any column rows keep an empty column list.
pub(crate) fn assemble_tables(
    tables: Vec<(String, String, String)>,
    columns: Vec<(String, String, ColumnMetadata)>,
) -> Vec<TableMetadata> {
    let mut by_table: BTreeMap<(String, String), Vec<ColumnMetadata>> = BTreeMap::new();
    for (schema, table, column) in columns {
        by_table.entry((schema, table)).or_default().push(column);
    }

    tables
        .into_iter()
        .map(|(schema, name, table_type)| {
            let mut columns = by_table.remove(&(schema.clone(), name.clone())).unwrap_or_default();
            columns.sort_by_key(|c| c.ordinal_position);
            TableMetadata { schema, name, kind: TableKind::from_table_type(&table_type), columns }
        })
        .collect()
}

/// Database engine adapter
///
/// Every operation takes the descriptor of the target database, opens its own
/// connection, and releases it before returning on every path.
#[async_trait]
pub trait EngineAdapter: Send + Sync + 'static {
    /// Canonical engine identifier (`postgresql`, `mysql`, ...)
    fn engine_id(&self) -> &'static str;

    /// SQL grammar used to validate and re-render queries for this engine
    fn dialect(&self) -> SqlDialect;

    /// Schema assumed when an object carries none (empty for engines without schemas)
    fn default_schema(&self) -> &'static str;

    /// Open and immediately close a connection.
    ///
    /// Any failure (auth, network, DNS) yields `false`; nothing is propagated.
    async fn test_connectivity(&self, descriptor: &ConnectionDescriptor) -> bool;

    /// Execute exactly `sql` (already validated and bounded) and materialize all rows.
    ///
    /// Driver failures are wrapped as `QueryExecution` errors.
    async fn run_query(&self, descriptor: &ConnectionDescriptor, sql: &str) -> Result<QueryResult>;

    /// Enumerate all tables and views outside system schemas, with their columns.
    async fn list_schema_objects(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<TableMetadata>>;

    /// Columns of a single table; empty (not an error) for unknown tables.
    async fn list_columns(
        &self,
        descriptor: &ConnectionDescriptor,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>>;

    /// Tables and views, optionally restricted to one schema.
    async fn list_tables(
        &self,
        descriptor: &ConnectionDescriptor,
        schema: Option<&str>,
    ) -> Result<Vec<TableSummary>> {
        let tables = self.list_schema_objects(descriptor).await?;
        Ok(tables
            .iter()
            .filter(|t| schema.map_or(true, |s| t.schema == s))
            .map(TableMetadata::summary)
            .collect())
    }
}
