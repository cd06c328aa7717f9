//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlgate.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `UnsupportedEngine`: Unknown or unregistered engine identifier
//! - `SqlSyntax` / `DisallowedStatement`: Query rejected before any network call
//! - `QueryExecution`: Adapter/driver failure while running a validated query
//! - `ConnectionNotFound` / `MetadataNotFound`: Lookups against the catalog
//! - `ConnectionFailed`, `Engine`, `Timeout`: Target database failures
//! - `InvalidInput`, `Catalog`, `Config`, `Llm`: Everything around the core

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Engine identifier was never registered
    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The SQL parser rejected the text
    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    /// Parsed, but not a pure read
    #[error("Statement type {kind} is not allowed. Only SELECT statements are permitted")]
    DisallowedStatement { kind: String },

    /// Query execution failed on the target database
    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    /// Could not reach or authenticate against the target database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No stored connection with that name
    #[error("Database connection '{0}' not found")]
    ConnectionNotFound(String),

    /// Connection exists, but no refreshed metadata yet
    #[error("Metadata for database '{0}' not found. Refresh metadata first")]
    MetadataNotFound(String),

    /// Engine-specific database error (metadata enumeration, etc.)
    #[error("Engine error ({engine}): {detail}")]
    Engine { engine: String, detail: String },

    /// Adapter call exceeded the per-operation deadline
    #[error("{operation} exceeded timeout of {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Connection/metadata catalog error
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Natural-language SQL generation failed
    #[error("LLM error: {0}")]
    Llm(String),
}

impl GatewayError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedEngine(_) => "UNSUPPORTED_ENGINE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::SqlSyntax(_) => "SQL_SYNTAX_ERROR",
            Self::DisallowedStatement { .. } => "DISALLOWED_STATEMENT",
            Self::QueryExecution(_) => "QUERY_EXECUTION_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::MetadataNotFound(_) => "METADATA_NOT_FOUND",
            Self::Engine { .. } => "ENGINE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Catalog(_) => "CATALOG_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Llm(_) => "LLM_ERROR",
        }
    }

    /// Get human-readable error message (no credentials, no stack traces)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// True for the errors produced by SQL validation (syntax or statement type).
    ///
    /// These are detected before any network call and are never worth retrying.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::SqlSyntax(_) | Self::DisallowedStatement { .. })
    }

    /// Create an unsupported engine error
    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine(engine.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a SQL syntax error
    pub fn sql_syntax(message: impl Into<String>) -> Self {
        Self::SqlSyntax(message.into())
    }

    /// Create a disallowed statement error
    pub fn disallowed_statement(kind: impl Into<String>) -> Self {
        Self::DisallowedStatement { kind: kind.into() }
    }

    /// Create a query execution error
    pub fn query_execution(message: impl Into<String>) -> Self {
        Self::QueryExecution(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a connection not found error
    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionNotFound(name.into())
    }

    /// Create a metadata not found error
    pub fn metadata_not_found(name: impl Into<String>) -> Self {
        Self::MetadataNotFound(name.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Engine { engine: engine.into(), detail: detail.into() }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), timeout_ms }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Catalog(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
