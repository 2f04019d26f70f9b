//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{QuotaError, Result};

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// `format = "json"` switches to JSON lines, anything else is pretty output.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| QuotaError::Config(format!("invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer().pretty()).try_init(),
    }
    .map_err(|e| QuotaError::Config(e.to_string()))
}
