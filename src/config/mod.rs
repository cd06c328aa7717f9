//! Configuration Management
//!
//! This module loads gateway settings: catalog location, query defaults, logging and
//! the optional LLM provider.
//!
//! # Configuration Locations
//! - Local: `.sqlgate/config.json` (per-project)
//! - Global: `~/.config/sqlgate/config.json` (per-user, via `dirs::config_dir`)
//!
//! # Resolution Precedence
//! 1. Explicit `--config` path (highest priority)
//! 2. Local config file (`.sqlgate/config.json`)
//! 3. Global config file (`~/.config/sqlgate/config.json`)
//! 4. Built-in defaults
//!
//! The first file found wins whole; files are not merged. Missing files are not errors,
//! malformed ones are.
//!
//! # Environment
//! - `SQLGATE_CATALOG` overrides the catalog path
//! - The LLM API key falls back to the variable named by `llm.api_key_env`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};
use crate::validator::DEFAULT_LIMIT;

/// Environment variable overriding the catalog path
pub const CATALOG_ENV: &str = "SQLGATE_CATALOG";

/// Gateway configuration (every field optional in the file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// SQLite catalog file (defaults to `<data_dir>/sqlgate/catalog.db`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Row limit injected into unbounded queries
    pub default_limit: u64,

    /// Deadline for each adapter call
    pub operation_timeout_ms: u64,

    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,

    /// Enrichment / natural-language SQL provider
    pub llm: LlmConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            default_limit: DEFAULT_LIMIT,
            operation_timeout_ms: 30_000,
            log_level: "warn".to_string(),
            llm: LlmConfig::default(),
        }
    }
}

/// OpenAI-compatible provider settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,

    /// Inline API key (prefer `api_key_env`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    /// Inline key, else the environment variable; empty values count as absent
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl GatewayConfig {
    /// Catalog path after applying `SQLGATE_CATALOG` and the platform default
    pub fn resolve_catalog_path(&self) -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CATALOG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = &self.catalog_path {
            return Ok(path.clone());
        }
        default_catalog_path()
    }
}

/// Get path to local config file (`.sqlgate/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        GatewayError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".sqlgate").join("config.json"))
}

/// Get path to global config file (`~/.config/sqlgate/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| GatewayError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlgate").join("config.json"))
}

/// Default catalog location (`<data_dir>/sqlgate/catalog.db`)
pub fn default_catalog_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| GatewayError::config_error("Could not determine user data directory"))?;

    Ok(data_dir.join("sqlgate").join("catalog.db"))
}

/// Load a config file; `None` when it does not exist
pub fn load_config(path: &Path) -> Result<Option<GatewayConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        GatewayError::config_error(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map(Some).map_err(|e| {
        GatewayError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })
}

/// Resolve configuration with precedence (explicit > local > global > defaults)
///
/// An explicit path that does not exist is an error; implicit locations are optional.
pub fn load_with_precedence(explicit: Option<&Path>) -> Result<GatewayConfig> {
    if let Some(path) = explicit {
        return load_config(path)?.ok_or_else(|| {
            GatewayError::config_error(format!("Config file not found: {}", path.display()))
        });
    }

    if let Some(config) = load_config(&local_config_path()?)? {
        return Ok(config);
    }

    // A missing config directory only means there is no global file
    if let Ok(global) = global_config_path() {
        if let Some(config) = load_config(&global)? {
            return Ok(config);
        }
    }

    Ok(GatewayConfig::default())
}
