//! SQLite-backed catalog
//!
//! `rusqlite` is synchronous: every call runs on the blocking pool. A session owns one
//! `Connection` (`Send` but not `Sync`), so it sits behind a mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Catalog, CatalogFactory, StoredConnection, StoredMetadata};
use crate::error::{GatewayError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS connections (
        name        TEXT PRIMARY KEY,
        url         TEXT NOT NULL,
        engine      TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS metadata (
        connection_name  TEXT PRIMARY KEY,
        metadata_json    TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    );";

/// Opens a fresh SQLite session per call
#[derive(Debug, Clone)]
pub struct SqliteCatalogFactory {
    path: PathBuf,
}

impl SqliteCatalogFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogFactory for SqliteCatalogFactory {
    fn open_session(&self) -> Result<Box<dyn Catalog>> {
        Ok(Box::new(SqliteCatalog::open(&self.path)?))
    }
}

/// One SQLite connection to the catalog file
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (creating file, parent directories and tables as needed)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::catalog(format!("Could not create catalog directory: {e}"))
            })?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Catalog living only as long as this session
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run a synchronous closure on the session's connection inside `spawn_blocking`
    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| GatewayError::catalog(format!("Catalog task failed: {e}")))?
    }
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn connection_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredConnection> {
    Ok(StoredConnection {
        name: row.get(0)?,
        url: row.get(1)?,
        engine: row.get(2)?,
        created_at: parse_timestamp(&row.get::<_, String>(3)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(4)?)?,
    })
}

fn select_connection(conn: &Connection, name: &str) -> Result<Option<StoredConnection>> {
    Ok(conn
        .query_row(
            "SELECT name, url, engine, created_at, updated_at FROM connections WHERE name = ?1",
            params![name],
            connection_from_row,
        )
        .optional()?)
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn get_connection(&self, name: &str) -> Result<Option<StoredConnection>> {
        let name = name.to_string();
        self.with_conn(move |conn| select_connection(conn, &name)).await
    }

    async fn list_connections(&self) -> Result<Vec<StoredConnection>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, url, engine, created_at, updated_at FROM connections ORDER BY name",
            )?;
            let rows = stmt.query_map([], connection_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn upsert_connection(&self, name: &str, url: &str, engine: &str) -> Result<StoredConnection> {
        let (name, url, engine) = (name.to_string(), url.to_string(), engine.to_string());
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO connections (name, url, engine, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     url = excluded.url,
                     engine = excluded.engine,
                     updated_at = excluded.updated_at",
                params![name, url, engine, now],
            )?;
            select_connection(conn, &name)?.ok_or_else(|| {
                GatewayError::catalog(format!("Connection '{name}' vanished after upsert"))
            })
        })
        .await
    }

    async fn delete_connection(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM connections WHERE name = ?1", params![name])? > 0)
        })
        .await
    }

    async fn get_metadata(&self, name: &str) -> Result<Option<StoredMetadata>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT metadata_json, updated_at FROM metadata WHERE connection_name = ?1",
                    params![name],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let Some((json, updated_at)) = row else {
                return Ok(None);
            };
            let metadata = serde_json::from_str(&json).map_err(|e| {
                GatewayError::catalog(format!("Stored metadata for '{name}' is not valid JSON: {e}"))
            })?;

            Ok(Some(StoredMetadata {
                connection_name: name,
                metadata,
                updated_at: parse_timestamp(&updated_at)?,
            }))
        })
        .await
    }

    async fn put_metadata(&self, name: &str, metadata: serde_json::Value) -> Result<StoredMetadata> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let updated_at = Utc::now();
            let json = serde_json::to_string(&metadata)
                .map_err(|e| GatewayError::catalog(format!("Could not serialize metadata: {e}")))?;
            conn.execute(
                "INSERT INTO metadata (connection_name, metadata_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(connection_name) DO UPDATE SET
                     metadata_json = excluded.metadata_json,
                     updated_at = excluded.updated_at",
                params![name, json, updated_at.to_rfc3339()],
            )?;
            Ok(StoredMetadata { connection_name: name, metadata, updated_at })
        })
        .await
    }

    async fn delete_metadata(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM metadata WHERE connection_name = ?1", params![name])? > 0)
        })
        .await
    }
}
