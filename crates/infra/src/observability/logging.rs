//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use unimoghub_domain::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `config.level` when it is set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    if config.json {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).try_init()?;
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init()?;
    }

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}
