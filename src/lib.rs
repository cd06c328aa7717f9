//! sqlgate - Read-Only SQL Gateway
//!
//! sqlgate stores named database connections, keeps an LLM-friendly description of each
//! connection's schema, and executes strictly read-only, row-bounded SQL against them.
//!
//! # Core Principles
//! - Reads only: every statement is parsed and rejected unless it is a pure query
//! - Bounded results: queries without a row limit get one injected
//! - Engines are pluggable: adapters register under an identifier, resolved lazily
//! - Enrichment is optional: when the LLM is unavailable, a deterministic shape is stored
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelope types
//! - [`engine`] - Connection descriptors, adapter trait, registry and built-in adapters
//! - [`validator`] - Read-only validation and row bounding
//! - [`catalog`] - Connection store and persisted metadata
//! - [`llm`] - Metadata enrichment and natural-language SQL generation
//! - [`service`] - Connection, query and metadata orchestration
//! - [`gateway`] - Composition root
//! - [`config`] - Configuration management

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod output;
pub mod service;
pub mod validator;

pub use catalog::{Catalog, CatalogFactory, MemoryCatalog, SqliteCatalog, SqliteCatalogFactory, StoredConnection, StoredMetadata};
pub use config::{load_with_precedence, GatewayConfig, LlmConfig};
pub use engine::{
    detect_engine, AdapterFactory, AdapterRegistry, ColumnMetadata, ConnectionDescriptor, EngineAdapter,
    QueryResult, SqlDialect, TableKind, TableMetadata, TableSummary,
};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use service::{fallback_metadata, AskResult, ConnectionService, MetadataService, QueryService, ServiceSettings};
pub use validator::{bound_query, validate_read_only, QueryValidator, DEFAULT_LIMIT};
