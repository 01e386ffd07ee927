//! rtdb CLI - Command-line tool for hierarchical JSON document stores
//!
//! Reads, writes and watches paths of a store reachable over HTTP.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtdb_client::{RtdbClient, StaticSecret};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::{QueryArgs, RulesAction};
use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "rtdb-cli")]
#[command(author, version, about = "Realtime JSON store CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL [default: http://localhost:9000]
    #[arg(short, long, env = "RTDB_SERVER")]
    server: Option<String>,

    /// Database secret
    #[arg(short, long, env = "RTDB_AUTH", hide_env_values = true)]
    auth: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "RTDB_CONFIG")]
    config: Option<PathBuf>,

    /// Output format [default: table]
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the value at a path
    Get {
        path: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Replace the value at a path
    Set {
        path: String,

        /// Value to write (string, number, or JSON)
        value: String,
    },

    /// Add a child with a generated key
    Push {
        path: String,

        /// Value to write (string, number, or JSON)
        value: String,
    },

    /// Merge a JSON object into a path
    Update {
        path: String,

        /// JSON object whose keys may be nested paths
        value: String,
    },

    /// Remove the value at a path
    Delete { path: String },

    /// Watch a path for changes (event stream)
    Watch {
        path: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Read or replace the security rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    let merged = config.merge_with_args(
        cli.server.as_deref(),
        cli.auth.as_deref(),
        cli.output,
        cli.no_color,
    );

    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);
    let client = create_client(&merged)?;

    match &cli.command {
        Commands::Get { path, query } => commands::get(&client, path, query, &ctx).await?,
        Commands::Set { path, value } => commands::set(&client, path, value, &ctx).await?,
        Commands::Push { path, value } => commands::push(&client, path, value, &ctx).await?,
        Commands::Update { path, value } => commands::update(&client, path, value, &ctx).await?,
        Commands::Delete { path } => commands::delete(&client, path, &ctx).await?,
        Commands::Watch { path, query } => commands::watch(&client, path, query, &ctx).await?,
        Commands::Rules { action } => commands::rules(&client, action, &ctx).await?,
    }

    Ok(())
}

/// Create a client for the configured server
fn create_client(config: &MergedConfig) -> Result<RtdbClient> {
    debug!(server = %config.server, authenticated = config.auth.is_some(), "Creating client");
    let client = RtdbClient::new(&config.server).context("Failed to create client")?;
    Ok(match &config.auth {
        Some(secret) => client.with_auth(Arc::new(StaticSecret::new(secret.clone()))),
        None => client,
    })
}
