//! Metadata refresh with enrichment fallback
//!
//! `refresh` fails only when the adapter-level enumeration fails. Enrichment problems
//! of any kind are recovered locally by persisting the fallback document built by
//! [`fallback_metadata`].

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{require_name, ServiceSettings};
use crate::catalog::{Catalog, CatalogFactory, StoredMetadata};
use crate::engine::{AdapterRegistry, ConnectionDescriptor, TableMetadata};
use crate::error::{GatewayError, Result};
use crate::llm::{classify_enrichment_error, EnrichmentError, EnrichmentOutcome, MetadataEnricher};

/// Deterministic enrichment-free document:
/// `{"tables": [{"name": "schema.table", "type", "columns": [{"name", "type", "nullable", "default"}]}]}`
///
/// Tables without a schema are qualified with `default_schema`, or left bare when that
/// is empty too.
#[must_use]
pub fn fallback_metadata(tables: &[TableMetadata], default_schema: &str) -> Value {
    let tables: Vec<Value> = tables
        .iter()
        .map(|table| {
            let columns: Vec<Value> = table
                .columns
                .iter()
                .map(|column| {
                    json!({
                        "name": column.name,
                        "type": column.data_type,
                        "nullable": column.nullable,
                        "default": column.default_expr,
                    })
                })
                .collect();

            json!({
                "name": table.qualified_name(default_schema),
                "type": table.kind.as_str(),
                "columns": columns,
            })
        })
        .collect();

    json!({ "tables": tables })
}

#[derive(Clone)]
pub struct MetadataService {
    registry: Arc<AdapterRegistry>,
    enricher: Arc<dyn MetadataEnricher>,
    settings: ServiceSettings,
}

impl MetadataService {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        enricher: Arc<dyn MetadataEnricher>,
        settings: ServiceSettings,
    ) -> Self {
        Self { registry, enricher, settings }
    }

    /// Re-enumerate the connection's schema and replace its persisted metadata
    pub async fn refresh(&self, catalog: &dyn Catalog, name: &str) -> Result<StoredMetadata> {
        require_name(name)?;
        let connection = catalog
            .get_connection(name)
            .await?
            .ok_or_else(|| GatewayError::connection_not_found(name))?;

        let adapter = self.registry.resolve(&connection.engine)?;
        let descriptor = ConnectionDescriptor::parse(&connection.url)?;

        tracing::info!(connection = %name, engine = %adapter.engine_id(), "fetching schema metadata");
        let tables = self
            .settings
            .with_deadline("list_schema_objects", adapter.list_schema_objects(&descriptor))
            .await?;
        tracing::info!(connection = %name, tables = tables.len(), "fetched schema metadata");

        let outcome = self.enrich_or_fallback(&tables, adapter.default_schema()).await;
        if let EnrichmentOutcome::Fallback { reason, .. } = &outcome {
            match reason {
                EnrichmentError::QuotaExhausted(_) => {
                    tracing::warn!(connection = %name, reason = %reason, "enrichment quota exhausted, storing canonical metadata");
                }
                EnrichmentError::Failed(_) => {
                    tracing::warn!(connection = %name, reason = %reason, "enrichment failed, storing canonical metadata");
                }
            }
        }

        // A delete may have landed while the schema was being fetched
        if catalog.get_connection(name).await?.is_none() {
            tracing::warn!(connection = %name, "connection removed during refresh, discarding metadata");
            return Err(GatewayError::connection_not_found(name));
        }

        catalog.put_metadata(name, outcome.into_value()).await
    }

    /// Enrich `tables`, or build the fallback document when enrichment fails
    pub async fn enrich_or_fallback(&self, tables: &[TableMetadata], default_schema: &str) -> EnrichmentOutcome {
        match self.enricher.enrich(tables).await {
            Ok(data) => EnrichmentOutcome::Enriched(data),
            Err(err) => EnrichmentOutcome::Fallback {
                data: fallback_metadata(tables, default_schema),
                reason: classify_enrichment_error(&err),
            },
        }
    }

    /// Persisted metadata, if any (no implicit refresh)
    pub async fn get(&self, catalog: &dyn Catalog, name: &str) -> Result<Option<StoredMetadata>> {
        catalog.get_metadata(name).await
    }

    /// Persisted metadata of an existing connection.
    ///
    /// `ConnectionNotFound` for unknown names, `MetadataNotFound` before the first refresh.
    pub async fn require(&self, catalog: &dyn Catalog, name: &str) -> Result<StoredMetadata> {
        require_name(name)?;
        if catalog.get_connection(name).await?.is_none() {
            return Err(GatewayError::connection_not_found(name));
        }
        catalog
            .get_metadata(name)
            .await?
            .ok_or_else(|| GatewayError::metadata_not_found(name))
    }

    /// Refresh in a detached task on a freshly opened catalog session.
    ///
    /// Failures are logged, never propagated; the handle only signals completion.
    pub fn spawn_refresh(&self, catalogs: Arc<dyn CatalogFactory>, name: String) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let session = match catalogs.open_session() {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!(connection = %name, error = %e, "background refresh could not open catalog session");
                    return;
                }
            };

            match service.refresh(&*session, &name).await {
                Ok(stored) => {
                    tracing::info!(connection = %name, updated_at = %stored.updated_at, "background refresh complete");
                }
                Err(e) => {
                    tracing::error!(connection = %name, code = e.error_code(), error = %e, "background refresh failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService").field("settings", &self.settings).finish_non_exhaustive()
    }
}
