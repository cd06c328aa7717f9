//! Composition Root
//!
//! `Gateway` owns the adapter registry and the catalog factory and hands out services
//! wired to them. There is no process-global state: whoever builds the `Gateway`
//! decides which engines, catalog backend and LLM provider are in play.

use std::sync::Arc;

use crate::catalog::{Catalog, CatalogFactory, SqliteCatalogFactory};
use crate::config::GatewayConfig;
use crate::engine::AdapterRegistry;
use crate::error::{GatewayError, Result};
use crate::llm::{DisabledLlm, MetadataEnricher, OpenAiCompatClient, SqlGenerator};
use crate::service::{ConnectionService, MetadataService, QueryService, ServiceSettings};

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<AdapterRegistry>,
    catalogs: Arc<dyn CatalogFactory>,
    enricher: Arc<dyn MetadataEnricher>,
    generator: Arc<dyn SqlGenerator>,
    settings: ServiceSettings,
}

impl Gateway {
    /// Gateway with LLM features disabled and default settings
    pub fn new(registry: Arc<AdapterRegistry>, catalogs: Arc<dyn CatalogFactory>) -> Self {
        Self {
            registry,
            catalogs,
            enricher: Arc::new(DisabledLlm),
            generator: Arc::new(DisabledLlm),
            settings: ServiceSettings::default(),
        }
    }

    /// Built-in engines, SQLite catalog and (when a key is available) the configured LLM
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let catalog_path = config.resolve_catalog_path()?;
        tracing::debug!(catalog = %catalog_path.display(), "using catalog");

        let mut gateway = Self::new(
            Arc::new(AdapterRegistry::with_builtins()),
            Arc::new(SqliteCatalogFactory::new(catalog_path)),
        )
        .with_settings(ServiceSettings::from(config));

        match OpenAiCompatClient::from_config(&config.llm).map_err(|e| GatewayError::llm(e.to_string()))? {
            Some(client) => {
                let client = Arc::new(client);
                gateway = gateway.with_enricher(client.clone()).with_generator(client);
            }
            None => tracing::debug!("no LLM API key configured, enrichment disabled"),
        }

        Ok(gateway)
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn MetadataEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn settings(&self) -> ServiceSettings {
        self.settings
    }

    /// Fresh catalog session for one request
    pub fn session(&self) -> Result<Box<dyn Catalog>> {
        self.catalogs.open_session()
    }

    #[must_use]
    pub fn metadata(&self) -> MetadataService {
        MetadataService::new(Arc::clone(&self.registry), Arc::clone(&self.enricher), self.settings)
    }

    #[must_use]
    pub fn queries(&self) -> QueryService {
        QueryService::new(Arc::clone(&self.registry), Arc::clone(&self.generator), self.settings)
    }

    #[must_use]
    pub fn connections(&self) -> ConnectionService {
        ConnectionService::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.catalogs),
            self.metadata(),
            self.settings,
        )
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
