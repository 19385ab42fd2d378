//! # Command Line Interface
//!
//! `vault-inventory` lists secret metadata from a Vault server, looks up a
//! single secret, or reports the state of the configured credential.

pub mod output;

use crate::config::AppConfig;
use crate::enumerator::{Enumerator, SecretQuery};
use crate::observability::{init_logging, log_config_info};
use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use output::OutputFormat;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vault-inventory")]
#[command(about = "Read-only inventory of secrets stored in HashiCorp Vault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List metadata of every secret in the selected mounts
    Secrets {
        /// Only crawl this mount
        #[arg(long)]
        mount: Option<String>,

        /// Only this secret key
        #[arg(long, conflicts_with = "prefix")]
        key: Option<String>,

        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Number of concurrent crawl workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output format (json, yaml, table)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Show metadata of a single secret
    Get {
        /// Mount of the secret, e.g. secret/
        #[arg(long)]
        mount: String,

        /// Key of the secret below the mount
        #[arg(long)]
        key: String,

        /// Output format (json, yaml, table)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Authenticate and show the credential state
    AuthStatus {
        /// Output format (json, yaml, table)
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}

/// Credential summary printed by `auth-status`; never includes the token
#[derive(Debug, Serialize)]
struct AuthStatus {
    method: String,
    state: String,
    renewable: bool,
    ttl_seconds: u64,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    init_logging(&config.observability);
    config.validate().context("Invalid configuration")?;
    log_config_info(&config);

    let enumerator = Enumerator::from_config(&config)?;

    match cli.command {
        Commands::Secrets { mount, key, prefix, concurrency, output } => {
            let format: OutputFormat = output.parse()?;
            let mut query = SecretQuery { mount, concurrency, ..Default::default() };
            if let Some(key) = key {
                query = query.exact(key);
            } else if let Some(prefix) = prefix {
                query = query.prefix(prefix);
            }
            handle_secrets_command(&enumerator, &query, format).await?
        }
        Commands::Get { mount, key, output } => {
            let format: OutputFormat = output.parse()?;
            handle_get_command(&enumerator, &mount, &key, format).await?
        }
        Commands::AuthStatus { output } => {
            let format: OutputFormat = output.parse()?;
            handle_auth_status(&enumerator, format).await?
        }
    }

    Ok(())
}

async fn handle_secrets_command(
    enumerator: &Enumerator,
    query: &SecretQuery,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut stream = enumerator.list_secrets(query).await?;
    let mut collected = Vec::new();

    if format == OutputFormat::Table {
        println!("{}", output::secret_table_header());
    }

    while let Some(record) = stream.next().await {
        let record = record?;
        match format {
            OutputFormat::Json => output::print_json_line(&record)?,
            OutputFormat::Table => println!("{}", output::secret_row(&record)),
            OutputFormat::Yaml => collected.push(record),
        }
    }

    if format == OutputFormat::Yaml {
        output::print_yaml(&collected)?;
    }

    let stats = stream.stats();
    tracing::info!(
        folders_listed = stats.folders_listed,
        leaves_read = stats.leaves_read,
        nodes_skipped = stats.nodes_skipped,
        "Enumeration finished"
    );

    Ok(())
}

async fn handle_get_command(
    enumerator: &Enumerator,
    mount: &str,
    key: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let Some(record) = enumerator.get_secret(mount, key).await? else {
        anyhow::bail!("Secret '{}' not found in mount '{}'", key, mount);
    };

    match format {
        OutputFormat::Json => output::print_json(&record),
        OutputFormat::Yaml => output::print_yaml(&record),
        OutputFormat::Table => {
            println!("{}", output::secret_table_header());
            println!("{}", output::secret_row(&record));
            Ok(())
        }
    }
}

async fn handle_auth_status(
    enumerator: &Enumerator,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let credentials = enumerator.credentials();
    let credential = credentials.ensure_fresh().await?;

    let status = AuthStatus {
        method: credentials.method().to_string(),
        state: credentials.state().await.to_string(),
        renewable: credential.renewable,
        ttl_seconds: credential.ttl.as_secs(),
        expires_at: credential.expires_at,
    };

    match format {
        OutputFormat::Json => output::print_json(&status),
        OutputFormat::Yaml => output::print_yaml(&status),
        OutputFormat::Table => {
            println!("Method:     {}", status.method);
            println!("State:      {}", status.state);
            println!("Renewable:  {}", status.renewable);
            println!("TTL:        {}s", status.ttl_seconds);
            match status.expires_at {
                Some(expires_at) => println!("Expires at: {}", expires_at.to_rfc3339()),
                None => println!("Expires at: never"),
            }
            Ok(())
        }
    }
}
