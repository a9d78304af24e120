//! CLI argument parsing for optionstore

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "opts")]
#[command(author, version, about = "Hierarchical persisted options store", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Trace option reads, writes and rejections
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective value at a dotted key
    Get {
        /// Dotted key, e.g. editor.tabSize
        #[arg(required = true)]
        key: String,
    },

    /// Set one or more options (applied together, hooks flushed once)
    Set {
        /// KEY=VALUE pairs; VALUE is parsed as JSON, else taken as a string
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, Value)>,
    },

    /// Reset an option to its default
    Reset {
        /// Dotted key
        #[arg(required = true)]
        key: String,
    },

    /// Print every effective option
    Dump,

    /// Print only the stored overrides
    Stored,
}

/// Parse `key=value`, reading the value as JSON when it parses
pub fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
