//! dman - inspect a PostgreSQL server and run SQL batches atomically.

mod cli;

use cli::{Cli, Command};
use dman::batch::{BatchOptions, ExecutionOutcome};
use dman::config::{Config, ConnectionConfig};
use dman::db::{self, DatabaseClient};
use dman::error::{DmanError, Result};
use dman::logging;
use serde::Serialize;
use std::io::Write;
use tracing::{debug, error, info, warn};

/// Exit status when an `exec` batch fails and was rolled back.
const EXIT_BATCH_FAILED: i32 = 1;

/// Exit status for configuration, connection and other errors.
const EXIT_ERROR: i32 = 2;

/// Exit status when every statement ran but the commit failed.
const EXIT_COMMIT_FAILED: i32 = 3;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: could not load .env file: {e}");
        }
    }

    let cli = Cli::parse_args();
    logging::init_stderr_logging(logging::default_level(cli.verbose));

    match run(&cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}: {}", e.category(), e.message());
            eprintln!("{e}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // Read the batch before connecting so that input errors need no server.
    let sql = match &cli.command {
        Command::Exec(args) => Some(args.read_sql(std::io::stdin().lock())?),
        _ => None,
    };

    // Build connection config with precedence:
    // 1. CLI arguments (highest)
    // 2. Named connection from config
    // 3. Default connection from config
    // 4. Environment variables
    let connection = resolve_connection(cli, &config)?;
    info!("Connection: {}", connection.display_string());

    let client = db::connect(&connection).await?;
    let mut stdout = std::io::stdout().lock();
    let result = run_command(
        &cli.command,
        sql.as_deref(),
        client.as_ref(),
        config.executor.to_batch_options(),
        cli.pretty,
        &mut stdout,
    )
    .await;

    if let Err(e) = client.close().await {
        warn!("Failed to close connection: {}", e);
    }
    result
}

/// Runs one subcommand against `client`, writing JSON to `out`.
///
/// Returns the process exit status.
async fn run_command(
    command: &Command,
    sql: Option<&str>,
    client: &dyn DatabaseClient,
    base_options: BatchOptions,
    pretty: bool,
    out: &mut impl Write,
) -> Result<i32> {
    match command {
        Command::Databases => {
            write_json(out, &client.list_databases().await?, pretty)?;
            Ok(0)
        }
        Command::Schemas => {
            write_json(out, &client.list_schemas().await?, pretty)?;
            Ok(0)
        }
        Command::Exec(args) => {
            let options = args.batch_options(base_options);
            let sql = sql.unwrap_or_default();
            let (outcome, code) = match client.execute_batch(sql, &options).await {
                Ok(outcome) => (outcome, 0),
                Err(e) => {
                    error!("Batch failed: {}", e);
                    let code = match e {
                        DmanError::Commit(_) => EXIT_COMMIT_FAILED,
                        _ => EXIT_BATCH_FAILED,
                    };
                    (ExecutionOutcome::failed(&e), code)
                }
            };
            write_json(out, &outcome, pretty)?;
            Ok(code)
        }
    }
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| DmanError::internal(format!("Failed to serialize output: {e}")))?;

    writeln!(out, "{json}")
        .map_err(|e| DmanError::internal(format!("Failed to write output: {e}")))
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(DmanError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    let mut connection = connection.unwrap_or_default();
    connection.apply_env_defaults();
    Ok(connection)
}
