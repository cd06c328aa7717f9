//! Engine Adapter Registry
//!
//! Maps engine identifiers to adapter factories and hands out one shared adapter
//! instance per engine, constructed on first use.
//!
//! # Identifiers
//! Lookups are case-insensitive. Aliases (`postgres`, `mariadb`) resolve to the
//! canonical identifier and therefore share its instance.
//!
//! # Concurrency
//! Registration and resolution may race from many tasks. The lazy construction path
//! re-checks under the write lock, so concurrent first resolutions of one engine still
//! observe a single instance.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::EngineAdapter;
use crate::error::{GatewayError, Result};

/// Constructor for an engine adapter
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn EngineAdapter> + Send + Sync>;

struct Registration {
    factory: AdapterFactory,
    instance: Option<Arc<dyn EngineAdapter>>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Registration>,
    aliases: HashMap<String, String>,
}

impl RegistryState {
    fn canonical(&self, engine_id: &str) -> String {
        let id = engine_id.trim().to_ascii_lowercase();
        self.aliases.get(&id).cloned().unwrap_or(id)
    }
}

/// Engine identifier -> adapter mapping
#[derive(Default)]
pub struct AdapterRegistry {
    state: RwLock<RegistryState>,
}

impl AdapterRegistry {
    /// Empty registry (no engines)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every adapter compiled into this build
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        #[cfg(feature = "postgres")]
        {
            registry.register(super::ENGINE_POSTGRESQL, || Arc::new(super::postgres::PostgresAdapter));
            registry.alias("postgres", super::ENGINE_POSTGRESQL);
        }

        #[cfg(feature = "mysql")]
        {
            registry.register(super::ENGINE_MYSQL, || Arc::new(super::mysql::MySqlAdapter));
            registry.alias("mariadb", super::ENGINE_MYSQL);
        }

        registry
    }

    /// Register (or replace) the factory for an engine.
    ///
    /// Replacing drops any instance already built from the previous factory.
    pub fn register<F>(&self, engine_id: &str, factory: F)
    where
        F: Fn() -> Arc<dyn EngineAdapter> + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        let id = state.canonical(engine_id);
        let previous = state
            .entries
            .insert(id.clone(), Registration { factory: Arc::new(factory), instance: None });

        if previous.is_some() {
            tracing::warn!(engine = %id, "replacing registered engine adapter");
        } else {
            tracing::debug!(engine = %id, "registered engine adapter");
        }
    }

    /// Make `alias` resolve to the canonical `engine_id`
    pub fn alias(&self, alias: &str, engine_id: &str) {
        let mut state = self.state.write();
        let target = state.canonical(engine_id);
        state.aliases.insert(alias.trim().to_ascii_lowercase(), target);
    }

    /// Shared adapter instance for an engine, constructing it on first use
    pub fn resolve(&self, engine_id: &str) -> Result<Arc<dyn EngineAdapter>> {
        {
            let state = self.state.read();
            let id = state.canonical(engine_id);
            match state.entries.get(&id) {
                None => return Err(GatewayError::unsupported_engine(engine_id)),
                Some(Registration { instance: Some(instance), .. }) => {
                    return Ok(Arc::clone(instance));
                }
                Some(_) => {}
            }
        }

        let mut state = self.state.write();
        let id = state.canonical(engine_id);
        let registration = state
            .entries
            .get_mut(&id)
            .ok_or_else(|| GatewayError::unsupported_engine(engine_id))?;

        let instance = match &registration.instance {
            Some(instance) => Arc::clone(instance),
            None => {
                let instance = (registration.factory)();
                registration.instance = Some(Arc::clone(&instance));
                tracing::debug!(engine = %id, "constructed engine adapter");
                instance
            }
        };
        Ok(instance)
    }

    /// Whether an engine (or alias) is registered
    #[must_use]
    pub fn is_supported(&self, engine_id: &str) -> bool {
        let state = self.state.read();
        state.entries.contains_key(&state.canonical(engine_id))
    }

    /// Registered canonical identifiers, sorted
    #[must_use]
    pub fn list_supported(&self) -> BTreeSet<String> {
        self.state.read().entries.keys().cloned().collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").field("engines", &self.list_supported()).finish()
    }
}
