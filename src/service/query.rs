//! Query execution: look up -> validate -> bound -> execute
//!
//! Validation happens before the adapter is touched, so a rejected query never opens a
//! connection to the target database.

use serde::Serialize;
use std::sync::Arc;

use super::{require_name, ServiceSettings};
use crate::catalog::{Catalog, StoredConnection};
use crate::engine::{AdapterRegistry, ConnectionDescriptor, QueryResult};
use crate::error::{GatewayError, Result};
use crate::llm::SqlGenerator;
use crate::validator::QueryValidator;

/// Natural-language query outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResult {
    /// Bounded SQL that was actually executed
    pub sql: String,
    pub result: QueryResult,
}

#[derive(Clone)]
pub struct QueryService {
    registry: Arc<AdapterRegistry>,
    validator: QueryValidator,
    generator: Arc<dyn SqlGenerator>,
    settings: ServiceSettings,
}

impl QueryService {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        generator: Arc<dyn SqlGenerator>,
        settings: ServiceSettings,
    ) -> Self {
        let validator = QueryValidator::new(Arc::clone(&registry));
        Self { registry, validator, generator, settings }
    }

    /// Run `sql` against a stored connection with the default row limit
    pub async fn execute(&self, catalog: &dyn Catalog, name: &str, sql: &str) -> Result<QueryResult> {
        self.execute_with_limit(catalog, name, sql, self.settings.default_limit).await
    }

    /// Run `sql` with an explicit row limit for unbounded queries
    pub async fn execute_with_limit(
        &self,
        catalog: &dyn Catalog,
        name: &str,
        sql: &str,
        limit: u64,
    ) -> Result<QueryResult> {
        let connection = self.lookup(catalog, name).await?;
        let (_, result) = self.run_read_only(&connection, sql, limit).await?;
        Ok(result)
    }

    /// Generate SQL from `prompt` using the connection's persisted metadata, then run it
    /// through the same validate -> bound -> execute pipeline.
    pub async fn ask(&self, catalog: &dyn Catalog, name: &str, prompt: &str) -> Result<AskResult> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::invalid_input("Prompt cannot be empty"));
        }
        let connection = self.lookup(catalog, name).await?;
        let metadata = catalog
            .get_metadata(name)
            .await?
            .ok_or_else(|| GatewayError::metadata_not_found(name))?;

        let generated = self
            .generator
            .generate_sql(prompt, &metadata.metadata, &connection.engine)
            .await
            .map_err(|e| GatewayError::llm(e.to_string()))?;
        tracing::debug!(connection = %name, sql = %generated, "generated SQL");

        let (sql, result) =
            self.run_read_only(&connection, &generated, self.settings.default_limit).await?;
        Ok(AskResult { sql, result })
    }

    async fn lookup(&self, catalog: &dyn Catalog, name: &str) -> Result<StoredConnection> {
        require_name(name)?;
        catalog
            .get_connection(name)
            .await?
            .ok_or_else(|| GatewayError::connection_not_found(name))
    }

    /// Returns the bounded SQL alongside the result
    async fn run_read_only(
        &self,
        connection: &StoredConnection,
        sql: &str,
        limit: u64,
    ) -> Result<(String, QueryResult)> {
        let validated = self.validator.validate(sql, &connection.engine)?;
        let bounded = self.validator.ensure_bounded(&validated, &connection.engine, limit);

        let adapter = self.registry.resolve(&connection.engine)?;
        let descriptor = ConnectionDescriptor::parse(&connection.url)?;

        tracing::debug!(connection = %connection.name, engine = %adapter.engine_id(), "executing query");
        let result = self
            .settings
            .with_deadline("run_query", adapter.run_query(&descriptor, &bounded))
            .await
            .map_err(|e| match e {
                GatewayError::QueryExecution(_) | GatewayError::Timeout { .. } => e,
                other => GatewayError::query_execution(other.message()),
            })?;

        Ok((bounded, result))
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService").field("settings", &self.settings).finish_non_exhaustive()
    }
}
