//! Connection Catalog
//!
//! Stores registered connections (`name -> url, engine`) and, per connection, one
//! persisted metadata slot holding a JSON document plus its last-updated timestamp.
//!
//! # Sessions
//! A [`CatalogFactory`] hands out independent [`Catalog`] sessions. Request paths and
//! detached background refreshes each open their own session and never share one
//! across a task boundary.
//!
//! # Backends
//! - [`MemoryCatalog`]: process-local, used by tests and embedding callers
//! - [`SqliteCatalog`]: on-disk catalog (`catalog.db`), one SQLite connection per session

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::{SqliteCatalog, SqliteCatalogFactory};

/// Registered connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Unique connection name
    pub name: String,

    /// Connection URL (source of truth for the descriptor)
    /// WARNING: May contain a password, do not log
    pub url: String,

    /// Engine identifier detected when the connection was saved
    pub engine: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted metadata slot of a connection (replaced wholesale on refresh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetadata {
    pub connection_name: String,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// One catalog session
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_connection(&self, name: &str) -> Result<Option<StoredConnection>>;

    /// All connections, ordered by name
    async fn list_connections(&self) -> Result<Vec<StoredConnection>>;

    /// Insert or update; `created_at` survives updates
    async fn upsert_connection(&self, name: &str, url: &str, engine: &str) -> Result<StoredConnection>;

    /// Returns whether a connection existed
    async fn delete_connection(&self, name: &str) -> Result<bool>;

    async fn get_metadata(&self, name: &str) -> Result<Option<StoredMetadata>>;

    /// Replace the metadata slot, stamping `updated_at` with the current time
    async fn put_metadata(&self, name: &str, metadata: serde_json::Value) -> Result<StoredMetadata>;

    /// Returns whether a slot existed
    async fn delete_metadata(&self, name: &str) -> Result<bool>;
}

/// Source of independent catalog sessions
pub trait CatalogFactory: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn Catalog>>;
}
