//! Sift MCP server
//!
//! Serves the sift search, ingestion and event tools to one MCP client over
//! stdio. Stdout carries the protocol, so all logging goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::StreamExt;
use rmcp::ServiceExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{error, info};

use sift_client::DomainRegistry;
use sift_common::SiftConfig;
use sift_tools::SiftServer;

#[derive(Debug, Parser)]
#[command(name = "sift-server", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to
    /// ~/.config/sift/config.toml, then SIFT_* environment variables.
    #[arg(short, long, env = "SIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration, print the domains and exit
    #[arg(long)]
    check: bool,
}

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `SIFT_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs
/// - `pretty`: Human-readable formatted logs (default)
///
/// Log level is controlled via `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("SIFT_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("sift_server=info,sift_client=info,sift_tools=info")
    });

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal(mut signals: Signals) {
    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM => {
                info!("Received SIGTERM, shutting down");
                return;
            }
            SIGINT => {
                info!("Received SIGINT, shutting down");
                return;
            }
            _ => {}
        }
    }
}

fn print_domains(registry: &DomainRegistry) {
    let default = registry.default_domain_id();
    for domain in registry.domains() {
        let config = domain.config();
        let marker = if default == Some(domain.id()) { " (default)" } else { "" };
        eprintln!(
            "{}{marker}: scopes [{}], api key {}",
            config.id,
            config.scopes,
            if domain.auth().has_api_key() { "set" } else { "missing" }
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let config = match SiftConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            if cli.config.is_none() {
                error!("Expected config at: {:?}", SiftConfig::config_path());
            }
            return Err(e).context("loading configuration");
        }
    };

    let registry = Arc::new(
        DomainRegistry::from_config(&config).context("building domain clients")?,
    );
    info!("Loaded {} domain(s)", registry.len());

    if cli.check {
        print_domains(&registry);
        return Ok(());
    }

    let signals = Signals::new([SIGTERM, SIGINT]).context("installing signal handlers")?;
    let handle = signals.handle();

    let service = SiftServer::new(&registry)
        .serve(rmcp::transport::stdio())
        .await
        .context("starting MCP session")?;

    info!("Serving MCP over stdio");

    // Dropping the running service on signal cancels it
    tokio::select! {
        reason = service.waiting() => {
            let reason = reason.context("MCP session task failed")?;
            info!("MCP session ended: {reason:?}");
        }
        () = shutdown_signal(signals) => {}
    }

    handle.close();
    info!("Shutdown complete");

    Ok(())
}
