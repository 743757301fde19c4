//! loghub - log search gateway
//!
//! Loads the configured log backends and serves the search API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use loghub_backends::{load_backends, GatewayConfig, LoadOptions, LoadReport};
use loghub_server::{init_logging, GatewayServer, LogFormat, ServerConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "loghub")]
#[command(about = "Search logs across Elasticsearch, OpenSearch, CloudWatch, Kubernetes and files")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "LOGHUB_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, default_value = "info", env = "LOGHUB_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the search gateway
    Serve {
        /// Backend configuration file; repeat to concatenate several
        #[arg(short, long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080", env = "LOGHUB_BIND")]
        bind: SocketAddr,

        /// Deadline for backends without their own timeout
        #[arg(long, default_value_t = 30)]
        backend_timeout_secs: u64,

        /// Ping every backend at startup and drop unreachable ones
        #[arg(long)]
        verify_backends: bool,
    },

    /// Load the configuration and report which backends would be served
    CheckConfig {
        /// Backend configuration file; repeat to concatenate several
        #[arg(short, long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// Also ping every backend
        #[arg(long)]
        verify_backends: bool,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Serve {
            configs,
            bind,
            backend_timeout_secs,
            verify_backends,
        } => {
            let timeout = Duration::from_secs(backend_timeout_secs);
            serve(&configs, bind, timeout, verify_backends).await?;
        }

        Commands::CheckConfig {
            configs,
            verify_backends,
        } => {
            check_config(&configs, verify_backends).await?;
        }

        Commands::Version => {
            println!("loghub {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn load(configs: &[PathBuf], verify: bool, timeout: Duration) -> anyhow::Result<LoadReport> {
    let config = GatewayConfig::from_files(configs).context("failed to read backend configuration")?;
    let options = LoadOptions::default()
        .with_verify(verify)
        .with_default_timeout(timeout);
    Ok(load_backends(config, &options).await)
}

async fn serve(
    configs: &[PathBuf],
    bind: SocketAddr,
    timeout: Duration,
    verify: bool,
) -> anyhow::Result<()> {
    let report = load(configs, verify, timeout).await?;
    if report.backends.is_empty() {
        error!("no usable backends configured; every search will return no results");
    }
    info!(
        backends = report.backends.len(),
        rejected = report.failures.len(),
        "starting loghub"
    );

    let config = ServerConfig::new(bind).with_default_backend_timeout(timeout);
    let server = GatewayServer::new(config, report.backends);
    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn check_config(configs: &[PathBuf], verify: bool) -> anyhow::Result<()> {
    let report = load(configs, verify, loghub_core::DEFAULT_BACKEND_TIMEOUT).await?;

    for backend in &report.backends {
        println!("ok      {:<12} {}", backend.kind(), backend.name());
    }
    for failure in &report.failures {
        println!("failed  entry {:<6} {}", failure.index, failure.error);
    }

    if !report.is_clean() {
        anyhow::bail!("{} backend entries were rejected", report.failures.len());
    }
    Ok(())
}
