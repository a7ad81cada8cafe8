//! # Command Line Interface
//!
//! Operator commands: seal credential envelopes, inspect stored records, and
//! run the registry with periodic health checks.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::domain::ProviderKind;
use crate::observability::init_logging;
use crate::secrets::{validate_envelope, CredentialCodec, CredentialKeyConfig};
use crate::startup::Backplane;
use crate::storage::{create_pool, ConnectionRepository};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "backplane")]
#[command(about = "Multi-backend connection registry tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Record store URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encrypt a JSON credential envelope and print the ciphertext
    Encrypt {
        /// File holding the JSON envelope (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Check the envelope against a provider before encrypting
        #[arg(long)]
        provider: Option<String>,
    },

    /// Decrypt and validate a stored record, printing a redacted summary
    Inspect {
        /// Connection record id
        #[arg(long)]
        id: i64,
    },

    /// Activate configured connections, print their health, and exit
    Health,

    /// Activate configured connections and health-check them until Ctrl-C
    Run,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut observability = ObservabilityConfig::from_env();
    if cli.verbose {
        observability.log_level = "debug".to_string();
    }
    initialise_logging(&observability)?;

    match cli.command {
        Commands::Encrypt { input, provider } => handle_encrypt(input, provider)?,
        Commands::Inspect { id } => handle_inspect(id, cli.database_url).await?,
        Commands::Health => handle_health(load_config(cli.database_url)?).await?,
        Commands::Run => handle_run(load_config(cli.database_url)?).await?,
    }

    Ok(())
}

fn initialise_logging(config: &ObservabilityConfig) -> anyhow::Result<()> {
    // Already-installed subscribers (embedding, tests) are left in place.
    init_logging(config).context("Failed to initialise logging")?;
    Ok(())
}

fn load_config(database_url: Option<String>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = database_url {
        config.store.url = url;
        config.validate()?;
    }
    Ok(config)
}

fn handle_encrypt(input: Option<PathBuf>, provider: Option<String>) -> anyhow::Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).context("Failed to read stdin")?;
            buffer
        }
    };

    let payload: Value = serde_json::from_str(&raw).context("Credential envelope is not valid JSON")?;
    anyhow::ensure!(payload.is_object(), "Credential envelope must be a JSON object");

    if let Some(provider) = provider {
        let kind: ProviderKind = provider.parse().map_err(anyhow::Error::msg)?;
        validate_envelope(kind, &payload)?;
    }

    let codec = CredentialCodec::new(&CredentialKeyConfig::from_env()?)?;
    println!("{}", codec.encrypt(&payload)?);
    Ok(())
}

async fn handle_inspect(id: i64, database_url: Option<String>) -> anyhow::Result<()> {
    let config = load_config(database_url)?;
    let pool = create_pool(&config.store).await?;
    let repository = ConnectionRepository::new(pool.clone());
    let record = repository.get_by_id(id).await?;

    let codec = CredentialCodec::new(&config.credentials)?;
    let envelope = codec.decrypt(&record.credentials).map(|payload| {
        let validation = match record.provider.parse::<ProviderKind>() {
            Ok(kind) => match validate_envelope(kind, &payload) {
                Ok(()) => json!("ok"),
                Err(e) => json!(e.to_string()),
            },
            Err(_) => json!("custom provider; not validated"),
        };
        json!({"keys": redacted_keys(&payload), "validation": validation})
    });

    let summary = json!({
        "record": serde_json::to_value(&record)?,
        "credentials": match envelope {
            Ok(envelope) => envelope,
            Err(e) => json!({"error": e.to_string(), "kind": e.kind()}),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    pool.close().await;
    Ok(())
}

/// Top-level envelope keys, with values hidden
fn redacted_keys(payload: &Value) -> Vec<String> {
    payload.as_object().map(|object| object.keys().cloned().collect()).unwrap_or_default()
}

async fn handle_health(config: AppConfig) -> anyhow::Result<()> {
    let backplane = Backplane::from_config(&config).await?;
    backplane.activate(&config).await;

    let report = backplane.health_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    backplane.shutdown().await;
    Ok(())
}

async fn handle_run(config: AppConfig) -> anyhow::Result<()> {
    let backplane = Backplane::from_config(&config).await?;
    let outcomes = backplane.activate(&config).await;
    info!(
        app_name = crate::APP_NAME,
        version = crate::VERSION,
        activated = outcomes.values().filter(|ok| **ok).count(),
        "Backplane running"
    );

    backplane
        .run_health_checks(config.observability.health_check_interval(), async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    backplane.shutdown().await;
    info!("Backplane shutdown completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["backplane", "inspect", "--id", "8", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Inspect { id: 8 }));
    }

    #[test]
    fn test_redacted_keys() {
        let keys = redacted_keys(&json!({"host": "db", "password": "hunter2"}));
        assert_eq!(keys, vec!["host", "password"]);
    }
}
