// 📝 Logging setup for binaries; the library only emits events
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "warn,property_flip=info";

/// Install a fmt subscriber filtered by `RUST_LOG` (falls back to
/// `DEFAULT_FILTER` when unset or unparsable). Errors if a global
/// subscriber is already installed.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
