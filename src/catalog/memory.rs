//! In-memory catalog. Every session cloned from one `MemoryCatalog` shares its state.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Catalog, CatalogFactory, StoredConnection, StoredMetadata};
use crate::error::Result;

#[derive(Debug, Default)]
struct State {
    connections: BTreeMap<String, StoredConnection>,
    metadata: BTreeMap<String, StoredMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_connection(&self, name: &str) -> Result<Option<StoredConnection>> {
        Ok(self.state.lock().connections.get(name).cloned())
    }

    async fn list_connections(&self) -> Result<Vec<StoredConnection>> {
        Ok(self.state.lock().connections.values().cloned().collect())
    }

    async fn upsert_connection(&self, name: &str, url: &str, engine: &str) -> Result<StoredConnection> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let created_at = state.connections.get(name).map_or(now, |existing| existing.created_at);
        let stored = StoredConnection {
            name: name.to_string(),
            url: url.to_string(),
            engine: engine.to_string(),
            created_at,
            updated_at: now,
        };
        state.connections.insert(name.to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete_connection(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().connections.remove(name).is_some())
    }

    async fn get_metadata(&self, name: &str) -> Result<Option<StoredMetadata>> {
        Ok(self.state.lock().metadata.get(name).cloned())
    }

    async fn put_metadata(&self, name: &str, metadata: serde_json::Value) -> Result<StoredMetadata> {
        let stored = StoredMetadata {
            connection_name: name.to_string(),
            metadata,
            updated_at: Utc::now(),
        };
        self.state.lock().metadata.insert(name.to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete_metadata(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().metadata.remove(name).is_some())
    }
}

impl CatalogFactory for MemoryCatalog {
    fn open_session(&self) -> Result<Box<dyn Catalog>> {
        Ok(Box::new(self.clone()))
    }
}
