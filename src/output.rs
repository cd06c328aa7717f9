//! JSON Output Envelope Types
//!
//! Every CLI command prints exactly one envelope to stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! `engine` is empty when the command is not bound to a connection (`list`) or failed
//! before the engine was known.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Engine of the connection the command ran against
    pub engine: String,

    /// Command that was executed (connect, query, refresh, ...)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self {
            ok: true,
            engine: engine.into(),
            command: command.into(),
            data,
            meta,
        }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub engine: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            engine: engine.into(),
            command: command.into(),
            error,
        }
    }

    /// Envelope carrying the stable code and message of `err`
    pub fn from_error(engine: impl Into<String>, command: impl Into<String>, err: &GatewayError) -> Self {
        Self::new(engine, command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. "DISALLOWED_STATEMENT", "CONNECTION_NOT_FOUND")
    pub code: String,

    /// Human-readable message; never contains credentials
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub execution_ms: u64,

    /// Only set for commands that return rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self {
            execution_ms,
            rows_returned: None,
        }
    }

    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self {
            execution_ms,
            rows_returned: Some(rows_returned),
        }
    }
}
