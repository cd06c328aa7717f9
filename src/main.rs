//! sqlgate CLI Entry Point
//!
//! Thin wrapper over the library: every command prints exactly one JSON envelope to
//! stdout and exits non-zero on error. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use sqlgate::{
    detect_engine, load_with_precedence, ConnectionDescriptor, ErrorEnvelope, Gateway, GatewayError,
    Metadata, StoredConnection, SuccessEnvelope,
};

/// sqlgate - read-only SQL gateway
#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(about = "Read-only SQL gateway with schema metadata and natural-language queries")]
#[command(version)]
struct Cli {
    /// Explicit config file (skips local/global lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or update a connection and refresh its metadata
    Connect { name: String, url: String },

    /// List registered connections
    List,

    /// Remove a connection and its metadata
    Delete { name: String },

    /// Re-read the schema and replace the stored metadata
    Refresh { name: String },

    /// Show the stored metadata
    Metadata { name: String },

    /// List tables and views, grouped by schema
    Tables {
        name: String,
        #[arg(long)]
        schema: Option<String>,
    },

    /// List the columns of one table
    Columns { name: String, schema: String, table: String },

    /// Run a read-only query
    Query {
        name: String,
        sql: String,
        /// Row limit injected when the query has none
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Generate SQL from a prompt and run it
    Ask { name: String, prompt: String },
}

impl Commands {
    const fn label(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::List => "list",
            Self::Delete { .. } => "delete",
            Self::Refresh { .. } => "refresh",
            Self::Metadata { .. } => "metadata",
            Self::Tables { .. } => "tables",
            Self::Columns { .. } => "columns",
            Self::Query { .. } => "query",
            Self::Ask { .. } => "ask",
        }
    }

    fn connection_name(&self) -> Option<&str> {
        match self {
            Self::Connect { name, .. }
            | Self::Delete { name }
            | Self::Refresh { name }
            | Self::Metadata { name }
            | Self::Tables { name, .. }
            | Self::Columns { name, .. }
            | Self::Query { name, .. }
            | Self::Ask { name, .. } => Some(name),
            Self::List => None,
        }
    }
}

struct Outcome {
    engine: String,
    data: Value,
    rows_returned: Option<usize>,
}

impl Outcome {
    fn new(engine: impl Into<String>, data: impl Serialize) -> Result<Self, GatewayError> {
        let data = serde_json::to_value(data)
            .map_err(|e| GatewayError::invalid_input(format!("Could not serialize output: {e}")))?;
        Ok(Self { engine: engine.into(), data, rows_returned: None })
    }

    fn with_rows(mut self, rows: usize) -> Self {
        self.rows_returned = Some(rows);
        self
    }
}

/// Connection as shown to the caller: the password never leaves the catalog
fn present(connection: &StoredConnection) -> Value {
    let url = ConnectionDescriptor::parse(&connection.url)
        .map_or_else(|_| connection.url.clone(), |d| d.redacted_url());
    json!({
        "name": connection.name,
        "url": url,
        "engine": connection.engine,
        "createdAt": connection.created_at,
        "updatedAt": connection.updated_at,
    })
}

async fn run(gateway: &Gateway, command: Commands) -> Result<Outcome, GatewayError> {
    let catalog = gateway.session()?;
    let catalog = &*catalog;

    match command {
        Commands::Connect { name, url } => {
            let (stored, refresh) = gateway.connections().save(catalog, &name, &url).await?;
            if let Err(e) = refresh.await {
                tracing::error!(connection = %name, error = %e, "metadata refresh task aborted");
            }
            let metadata = gateway.metadata().get(catalog, &name).await?;
            Outcome::new(
                &stored.engine,
                json!({ "connection": present(&stored), "metadataRefreshed": metadata.is_some() }),
            )
        }
        Commands::List => {
            let connections = gateway.connections().list(catalog).await?;
            let count = connections.len();
            let listed: Vec<Value> = connections.iter().map(present).collect();
            Ok(Outcome::new("", listed)?.with_rows(count))
        }
        Commands::Delete { name } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            gateway.connections().delete(catalog, &name).await?;
            Outcome::new(connection.engine, json!({ "name": name, "deleted": true }))
        }
        Commands::Refresh { name } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let stored = gateway.metadata().refresh(catalog, &name).await?;
            Outcome::new(connection.engine, stored)
        }
        Commands::Metadata { name } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let stored = gateway.metadata().require(catalog, &name).await?;
            Outcome::new(connection.engine, stored)
        }
        Commands::Tables { name, schema } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let tables = gateway.connections().tables(catalog, &name, schema.as_deref()).await?;
            Outcome::new(connection.engine, tables)
        }
        Commands::Columns { name, schema, table } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let columns = gateway.connections().columns(catalog, &name, &schema, &table).await?;
            let count = columns.len();
            Ok(Outcome::new(connection.engine, columns)?.with_rows(count))
        }
        Commands::Query { name, sql, limit } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let limit = limit.unwrap_or(gateway.settings().default_limit);
            let result = gateway.queries().execute_with_limit(catalog, &name, &sql, limit).await?;
            let count = result.row_count;
            Ok(Outcome::new(connection.engine, result)?.with_rows(count))
        }
        Commands::Ask { name, prompt } => {
            let connection = gateway.connections().get(catalog, &name).await?;
            let answer = gateway.queries().ask(catalog, &name, &prompt).await?;
            let count = answer.result.row_count;
            Ok(Outcome::new(connection.engine, answer)?.with_rows(count))
        }
    }
}

/// Best-effort engine label for error envelopes
async fn engine_hint(gateway: &Gateway, command: &Commands) -> String {
    if let Commands::Connect { url, .. } = command {
        let engine = detect_engine(url);
        return if gateway.registry().is_supported(engine) { engine.to_string() } else { String::new() };
    }
    let Some(name) = command.connection_name() else {
        return String::new();
    };
    match gateway.session() {
        Ok(catalog) => catalog
            .get_connection(name)
            .await
            .ok()
            .flatten()
            .map(|c| c.engine)
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("could not install log subscriber")
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string(value).context("could not serialize envelope")?;
    println!("{rendered}");
    Ok(())
}

fn emit_error(engine: &str, command: &str, err: &GatewayError) -> ExitCode {
    if let Err(e) = print_json(&ErrorEnvelope::from_error(engine, command, err)) {
        eprintln!("sqlgate: {e:#}");
    }
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let label = cli.command.label();

    let config = match load_with_precedence(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging("warn");
            return emit_error("", label, &e);
        }
    };
    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("sqlgate: {e:#}");
    }

    let gateway = match Gateway::from_config(&config) {
        Ok(gateway) => gateway,
        Err(e) => return emit_error("", label, &e),
    };

    let started = Instant::now();
    let engine_for_errors = engine_hint(&gateway, &cli.command).await;
    match run(&gateway, cli.command).await {
        Ok(outcome) => {
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let meta = match outcome.rows_returned {
                Some(rows) => Metadata::with_rows(elapsed, rows),
                None => Metadata::new(elapsed),
            };
            match print_json(&SuccessEnvelope::new(outcome.engine, label, outcome.data, meta)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("sqlgate: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            tracing::debug!(command = label, code = e.error_code(), "command failed");
            emit_error(&engine_for_errors, label, &e)
        }
    }
}
