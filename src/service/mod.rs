//! Gateway Services
//!
//! Orchestration on top of the adapters:
//! - [`ConnectionService`]: register/list/delete connections, live table and column drill-down
//! - [`QueryService`]: validate -> bound -> execute, plus natural-language queries
//! - [`MetadataService`]: refresh/get persisted metadata with enrichment fallback
//!
//! Services are cheap to clone (shared handles only) and take the catalog session to
//! work against as an argument.

use std::future::Future;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::validator::DEFAULT_LIMIT;

mod connections;
mod metadata;
mod query;

pub use connections::ConnectionService;
pub use metadata::{fallback_metadata, MetadataService};
pub use query::{AskResult, QueryService};

/// Knobs shared by all services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Row limit injected into unbounded queries
    pub default_limit: u64,

    /// Deadline applied to every adapter call
    pub operation_timeout_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { default_limit: DEFAULT_LIMIT, operation_timeout_ms: 30_000 }
    }
}

impl From<&GatewayConfig> for ServiceSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            operation_timeout_ms: config.operation_timeout_ms,
        }
    }
}

impl ServiceSettings {
    /// Run an adapter call under the per-operation deadline
    pub(crate) async fn with_deadline<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(Duration::from_millis(self.operation_timeout_ms), call)
            .await
            .map_err(|_| GatewayError::timeout(operation, self.operation_timeout_ms))?
    }
}

/// Reject blank connection names before touching the catalog
pub(crate) fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GatewayError::invalid_input("Connection name cannot be empty"));
    }
    Ok(())
}
