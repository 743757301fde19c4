//! Structured logging setup.

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One flattened JSON object per line.
    Json,
}

/// Initialize logging to stdout.
///
/// `RUST_LOG` wins over `level` when set. Call once at startup.
///
/// # Errors
///
/// Returns an error if `level` is not a valid filter directive.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_target(true).with_ansi(false))
            .try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_target(true)).try_init()?,
    }

    Ok(())
}
