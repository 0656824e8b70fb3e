//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, TaskError};

/// `RUST_LOG` takes precedence over the configured filter.
pub fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(cfg));
    let installed = match cfg.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|err| TaskError::Config(format!("failed to install tracing: {err}")))
}
