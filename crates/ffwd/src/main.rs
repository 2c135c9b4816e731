//! ffwd - metric and event forwarding daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon
//! ffwd
//! ffwd --config ffwd.toml
//!
//! # List discovered plugins and their capabilities
//! ffwd --plugins
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ffwd_config::{Config, LogFormat, LogOutput};
use ffwd_core::{PluginKind, PluginRegistry, Supervisor};
use ffwd_plugins::builtin_registry;
use ffwd_processor::ProcessorRegistry;

/// Metric and event forwarding daemon
#[derive(Parser, Debug)]
#[command(name = "ffwd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List discovered plugins and their capabilities, then exit
    #[arg(long)]
    plugins: bool,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.log_level.as_deref())?;

    let plugins = builtin_registry();

    if cli.plugins {
        list_plugins(&plugins);
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        "ffwd starting"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let supervisor = Supervisor::new(config, plugins, ProcessorRegistry::builtin());
    if let Err(e) = supervisor.run(shutdown).await {
        error!(error = %e, "supervisor error");
        return Err(e.into());
    }

    info!("ffwd shutdown complete");
    Ok(())
}

/// Load configuration: an explicit path must exist, otherwise well-known
/// locations are tried and empty defaults used as the last resort.
fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    for candidate in ["ffwd.toml", "/etc/ffwd/ffwd.toml"] {
        let candidate = std::path::Path::new(candidate);
        if candidate.exists() {
            return Config::from_file(candidate).context("failed to load configuration");
        }
    }

    Ok(Config::default())
}

/// Initialize the tracing subscriber from `[log]`, with the CLI flag taking
/// precedence over the configured level.
fn init_logging(config: &Config, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or_else(|| config.log.level.as_str());
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {e}"))?;

    let to_stdout = config.log.output == LogOutput::Stdout;
    match config.log.format {
        LogFormat::Json => {
            let layer = fmt::layer().json();
            if to_stdout {
                tracing_subscriber::registry()
                    .with(layer.with_writer(std::io::stdout))
                    .with(filter)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(layer.with_writer(std::io::stderr))
                    .with(filter)
                    .init();
            }
        }
        LogFormat::Console => {
            let layer = fmt::layer().with_target(true);
            if to_stdout {
                tracing_subscriber::registry()
                    .with(layer.with_writer(std::io::stdout))
                    .with(filter)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(layer.with_writer(std::io::stderr))
                    .with(filter)
                    .init();
            }
        }
    }

    Ok(())
}

/// Print the plugin table for `--plugins`.
fn list_plugins(registry: &PluginRegistry) {
    println!("{} plugin(s) discovered:", registry.len());
    for descriptor in registry.iter() {
        let mut capabilities = Vec::new();
        for kind in [PluginKind::Input, PluginKind::Output, PluginKind::Tunnel] {
            if descriptor.can(kind) {
                capabilities.push(kind.section());
            }
        }
        println!("  {:<12} {}", descriptor.name, capabilities.join(", "));
    }
}

/// Trip the shutdown token on ctrl-c or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut terminate =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
