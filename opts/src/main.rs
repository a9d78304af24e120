//! opts - inspect and edit a persisted options store

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use optionstore::cli::{Cli, Command};
use optionstore::config::StoreConfig;
use optionstore::{KeyPath, OptionsStore, SetOptionsEntry};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, debug_mode: bool) -> Result<()> {
    // Priority: --debug > CLI --log-level > config file > WARN
    let level = if debug_mode {
        tracing::Level::DEBUG
    } else {
        match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
            Some("TRACE") => tracing::Level::TRACE,
            Some("DEBUG") => tracing::Level::DEBUG,
            Some("INFO") => tracing::Level::INFO,
            Some("WARN") | Some("WARNING") | None => tracing::Level::WARN,
            Some("ERROR") => tracing::Level::ERROR,
            Some(other) => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", other);
                tracing::Level::WARN
            }
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!(?level, "Logging initialized");
    Ok(())
}

fn print_value(value: &Value) -> Result<()> {
    match value {
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = StoreConfig::load_log_level(cli.config.as_ref());
    let config = StoreConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        cli.debug || config.debug,
    )
    .context("Failed to setup logging")?;

    info!(store_path = %config.store_path.display(), "optionstore starting");
    let store = OptionsStore::open(&config).await.context("Failed to open options store")?;

    match cli.command {
        Command::Get { key } => {
            let key = KeyPath::parse(&key);
            match store.get_option(key.clone()).await? {
                Some(value) => print_value(&value)?,
                None => {
                    eprintln!("{} No value at {}", "✗".red(), key.to_string().yellow());
                    store.shutdown().await?;
                    std::process::exit(1);
                }
            }
        }
        Command::Set { assignments } => {
            let entries: Vec<SetOptionsEntry> = assignments
                .into_iter()
                .map(|(key, value)| SetOptionsEntry::new(key, value))
                .collect();
            let count = entries.len();
            store.set_options(entries).await?;
            println!("{} Applied {} option(s)", "✓".green(), count);
        }
        Command::Reset { key } => {
            let key = KeyPath::parse(&key);
            match store.default_of(key.clone()).await? {
                Some(value) => {
                    store.set_options(SetOptionsEntry::new(key.clone(), value)).await?;
                    println!("{} Reset {}", "✓".green(), key.to_string().cyan());
                }
                None => {
                    eprintln!("{} No default at {}", "✗".red(), key.to_string().yellow());
                }
            }
        }
        Command::Dump => {
            let all = store.get_all_options().await?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(all))?);
        }
        Command::Stored => {
            let stored = store.stored_options().await?;
            if stored.is_empty() {
                println!("No stored overrides");
            } else {
                println!("{}", serde_json::to_string_pretty(&Value::Object(stored))?);
            }
        }
    }

    store.shutdown().await?;
    Ok(())
}
