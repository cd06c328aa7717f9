//! Connection registration and live schema drill-down

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{require_name, MetadataService, ServiceSettings};
use crate::catalog::{Catalog, CatalogFactory, StoredConnection};
use crate::engine::{
    detect_engine, group_by_schema, AdapterRegistry, ColumnMetadata, ConnectionDescriptor,
    EngineAdapter, TableSummary,
};
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct ConnectionService {
    registry: Arc<AdapterRegistry>,
    catalogs: Arc<dyn CatalogFactory>,
    metadata: MetadataService,
    settings: ServiceSettings,
}

impl ConnectionService {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        catalogs: Arc<dyn CatalogFactory>,
        metadata: MetadataService,
        settings: ServiceSettings,
    ) -> Self {
        Self { registry, catalogs, metadata, settings }
    }

    /// Register (or update) a connection and schedule a detached metadata refresh.
    ///
    /// Unknown engines are rejected before any network call. The returned handle
    /// completes when the background refresh finishes; dropping it does not cancel it.
    pub async fn save(
        &self,
        catalog: &dyn Catalog,
        name: &str,
        url: &str,
    ) -> Result<(StoredConnection, JoinHandle<()>)> {
        require_name(name)?;

        let engine = detect_engine(url);
        if !self.registry.is_supported(engine) {
            return Err(GatewayError::unsupported_engine(engine));
        }
        let adapter = self.registry.resolve(engine)?;
        let descriptor = ConnectionDescriptor::parse(url)?;

        let reachable = self
            .settings
            .with_deadline("test_connectivity", async { Ok(adapter.test_connectivity(&descriptor).await) })
            .await
            .unwrap_or(false);
        if !reachable {
            return Err(GatewayError::connection_failed(format!(
                "Could not connect to {}",
                descriptor.redacted_url()
            )));
        }

        let stored = catalog.upsert_connection(name, url, adapter.engine_id()).await?;
        tracing::info!(connection = %name, engine = %stored.engine, "connection saved");

        let refresh = self.metadata.spawn_refresh(Arc::clone(&self.catalogs), name.to_string());
        Ok((stored, refresh))
    }

    /// All connections, ordered by name
    pub async fn list(&self, catalog: &dyn Catalog) -> Result<Vec<StoredConnection>> {
        catalog.list_connections().await
    }

    pub async fn get(&self, catalog: &dyn Catalog, name: &str) -> Result<StoredConnection> {
        require_name(name)?;
        catalog
            .get_connection(name)
            .await?
            .ok_or_else(|| GatewayError::connection_not_found(name))
    }

    /// Remove a connection and its metadata slot; returns whether it existed
    pub async fn delete(&self, catalog: &dyn Catalog, name: &str) -> Result<bool> {
        require_name(name)?;
        let existed = catalog.delete_connection(name).await?;
        catalog.delete_metadata(name).await?;
        if existed {
            tracing::info!(connection = %name, "connection deleted");
        }
        Ok(existed)
    }

    /// Live table/view listing grouped by schema, optionally for one schema only
    pub async fn tables(
        &self,
        catalog: &dyn Catalog,
        name: &str,
        schema: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<TableSummary>>> {
        let (adapter, descriptor) = self.target(catalog, name).await?;
        let tables = self
            .settings
            .with_deadline("list_tables", adapter.list_tables(&descriptor, schema))
            .await?;
        Ok(group_by_schema(tables))
    }

    /// Live column listing for one table (empty for unknown tables)
    pub async fn columns(
        &self,
        catalog: &dyn Catalog,
        name: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let (adapter, descriptor) = self.target(catalog, name).await?;
        self.settings
            .with_deadline("list_columns", adapter.list_columns(&descriptor, schema, table))
            .await
    }

    async fn target(
        &self,
        catalog: &dyn Catalog,
        name: &str,
    ) -> Result<(Arc<dyn EngineAdapter>, ConnectionDescriptor)> {
        let connection = self.get(catalog, name).await?;
        let adapter = self.registry.resolve(&connection.engine)?;
        let descriptor = ConnectionDescriptor::parse(&connection.url)?;
        Ok((adapter, descriptor))
    }
}

impl std::fmt::Debug for ConnectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionService").field("settings", &self.settings).finish_non_exhaustive()
    }
}
