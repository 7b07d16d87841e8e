//! `aaa-keys`: operator tool for the signing-key store.

use aaa_core::authn::OidcProvider;
use aaa_core::config::Config;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Manage signing keys and print provider metadata
#[derive(Parser, Debug)]
#[command(name = "aaa-keys")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log format; falls back to AAA_LOG_FORMAT, then text
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or load the key store and print the active kid
    Init,
    /// Rotate the file-backed key store and print the new kid
    Rotate,
    /// Print the JWKS document
    Jwks,
    /// Print the OIDC discovery document
    Discovery,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aaa_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the command output
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = cli.log_format.unwrap_or_else(|| {
        match std::env::var("AAA_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    });
    init_tracing(format);

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let key_store = config
        .open_key_store()
        .context("failed to open key store")?;

    match cli.command {
        Command::Init => {
            info!(
                kid = %key_store.signing_key().kid(),
                algorithm = %key_store.algorithm(),
                "Key store ready"
            );
            println!("{}", key_store.signing_key().kid());
        }
        Command::Rotate => {
            if config.key_store_path.is_none() {
                bail!("AAA_KEY_STORE_PATH must be set to rotate a persistent key store");
            }
            let kid = key_store.rotate_key().context("key rotation failed")?;
            println!("{kid}");
        }
        Command::Jwks => {
            let jwks = key_store.jwks()?;
            println!("{}", serde_json::to_string_pretty(&jwks)?);
        }
        Command::Discovery => {
            let provider = OidcProvider::new(config.provider_config()?, key_store)?;
            println!("{}", serde_json::to_string_pretty(&provider.discovery_document())?);
        }
    }

    Ok(())
}
