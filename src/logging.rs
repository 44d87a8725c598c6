//! Log output setup.
//!
//! Logs go to stderr; stdout carries only the per-account status lines so
//! that cron output and pipes stay clean.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::errors::{BlockerError, BlockerResult};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Does nothing if
/// logging is disabled.
pub fn init_logging(config: &LoggingConfig) -> BlockerResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .map_err(|e| BlockerError::ConfigError(format!("invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| BlockerError::ConfigError(format!("failed to install logger: {e}")))
}
