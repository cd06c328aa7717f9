//! Shared fixtures: an in-process spy adapter, scripted LLM doubles and a gateway
//! wired to a `MemoryCatalog`.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlgate::llm::{LlmError, MetadataEnricher, SqlGenerator};
use sqlgate::{
    AdapterRegistry, ColumnMetadata, ConnectionDescriptor, EngineAdapter, Gateway, GatewayError,
    MemoryCatalog, QueryResult, SqlDialect, StoredConnection, TableKind, TableMetadata,
};

pub const SALES_URL: &str = "postgresql://u:p@localhost/sales";

/// Adapter that records every call and never touches the network
pub struct SpyAdapter {
    pub connectivity_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub column_calls: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    pub reachable: bool,
    pub failing_metadata: bool,
    pub tables: Vec<TableMetadata>,
    pub result: QueryResult,
    /// Connection removed from this catalog while the schema is being listed
    pub delete_during_listing: Mutex<Option<(MemoryCatalog, String)>>,
}

impl SpyAdapter {
    pub fn new() -> Self {
        Self {
            connectivity_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            column_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            reachable: true,
            failing_metadata: false,
            tables: vec![orders_table()],
            result: three_orders(),
            delete_during_listing: Mutex::new(None),
        }
    }

    pub fn unreachable() -> Self {
        Self { reachable: false, ..Self::new() }
    }

    /// Reachable, but every schema listing fails
    pub fn failing_metadata() -> Self {
        Self { failing_metadata: true, ..Self::new() }
    }

    /// Deletes `name` from `catalog` on the next schema listing
    pub fn deleting_during_listing(catalog: &MemoryCatalog, name: &str) -> Self {
        let spy = Self::new();
        *spy.delete_during_listing.lock() = Some((catalog.clone(), name.to_string()));
        spy
    }

    /// Calls that would have opened a connection to the target database
    pub fn total_calls(&self) -> usize {
        self.connectivity_calls.load(Ordering::SeqCst)
            + self.query_calls.load(Ordering::SeqCst)
            + self.metadata_calls.load(Ordering::SeqCst)
            + self.column_calls.load(Ordering::SeqCst)
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl EngineAdapter for SpyAdapter {
    fn engine_id(&self) -> &'static str {
        "postgresql"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn default_schema(&self) -> &'static str {
        "public"
    }

    async fn test_connectivity(&self, _descriptor: &ConnectionDescriptor) -> bool {
        self.connectivity_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn run_query(&self, _descriptor: &ConnectionDescriptor, sql: &str) -> sqlgate::Result<QueryResult> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().push(sql.to_string());
        if sql.contains("missing_table") {
            return Err(GatewayError::engine_error("postgresql", "relation \"missing_table\" does not exist"));
        }
        Ok(self.result.clone())
    }

    async fn list_schema_objects(&self, _descriptor: &ConnectionDescriptor) -> sqlgate::Result<Vec<TableMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_metadata {
            return Err(GatewayError::engine_error("postgresql", "permission denied for schema information_schema"));
        }
        let pending = self.delete_during_listing.lock().take();
        if let Some((catalog, name)) = pending {
            use sqlgate::Catalog;
            catalog.delete_connection(&name).await?;
        }
        Ok(self.tables.clone())
    }

    async fn list_columns(
        &self,
        _descriptor: &ConnectionDescriptor,
        schema: &str,
        table: &str,
    ) -> sqlgate::Result<Vec<ColumnMetadata>> {
        self.column_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .iter()
            .find(|t| t.schema == schema && t.name == table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

pub fn column(name: &str, data_type: &str, nullable: bool, position: i64) -> ColumnMetadata {
    ColumnMetadata {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default_expr: None,
        ordinal_position: position,
    }
}

/// `public.orders (id integer not null, total numeric null)`
pub fn orders_table() -> TableMetadata {
    TableMetadata {
        schema: "public".to_string(),
        name: "orders".to_string(),
        kind: TableKind::Table,
        columns: vec![column("id", "integer", false, 1), column("total", "numeric", true, 2)],
    }
}

pub fn three_orders() -> QueryResult {
    QueryResult::new(
        vec!["id".to_string(), "total".to_string()],
        vec![
            vec![json!(1), json!("10.50")],
            vec![json!(2), json!("99.00")],
            vec![json!(3), Value::Null],
        ],
    )
}

/// Enricher that always fails the way an exhausted provider account does
pub struct BalanceExhaustedEnricher {
    pub calls: AtomicUsize,
}

impl BalanceExhaustedEnricher {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl MetadataEnricher for BalanceExhaustedEnricher {
    async fn enrich(&self, _tables: &[TableMetadata]) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Http { status: 402, message: "Insufficient Balance".to_string() })
    }
}

/// Enricher that returns a fixed document
pub struct StaticEnricher(pub Value);

#[async_trait]
impl MetadataEnricher for StaticEnricher {
    async fn enrich(&self, _tables: &[TableMetadata]) -> Result<Value, LlmError> {
        Ok(self.0.clone())
    }
}

/// Generator that answers every prompt with the same SQL
pub struct ScriptedGenerator {
    pub sql: String,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(sql: &str) -> Self {
        Self { sql: sql.to_string(), prompts: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate_sql(&self, prompt: &str, _metadata: &Value, engine_id: &str) -> Result<String, LlmError> {
        self.prompts.lock().push((prompt.to_string(), engine_id.to_string()));
        Ok(self.sql.clone())
    }
}

/// Gateway whose only engine is `spy`, registered as `postgresql`
pub fn gateway_with(spy: Arc<SpyAdapter>, catalog: &MemoryCatalog) -> Gateway {
    let registry = AdapterRegistry::new();
    registry.register("postgresql", move || Arc::clone(&spy) as Arc<dyn EngineAdapter>);
    Gateway::new(Arc::new(registry), Arc::new(catalog.clone()))
}

/// Store a connection directly, bypassing the connectivity check and refresh
pub async fn seed_connection(catalog: &MemoryCatalog, name: &str, url: &str) -> StoredConnection {
    use sqlgate::Catalog;
    catalog
        .upsert_connection(name, url, sqlgate::detect_engine(url))
        .await
        .expect("seed connection")
}
