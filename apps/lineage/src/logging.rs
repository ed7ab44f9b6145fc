//! # Logging
//!
//! tracing-subscriber setup. Log lines go to stderr so that command output
//! on stdout stays machine-readable.

use crate::config::{LOG_FORMAT_ENV, LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter, and
/// `LINEAGE_LOG_FORMAT` over the configured format.
pub fn init(config: &LoggingConfig) {
    let env_format = std::env::var(LOG_FORMAT_ENV).ok();
    let format = config.effective_format(env_format.as_deref());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.filter.as_str().into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
