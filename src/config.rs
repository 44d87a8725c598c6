//! Configuration system for userblock.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `USERBLOCK_GRACE_PERIOD_SECS` - Seconds an account may stay unconfirmed
//! - `USERBLOCK_BATCH_MODE` - `stop_on_skip` or `continue`
//! - `USERBLOCK_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `USERBLOCK_DATABASE_URL` - Database connection URL
//! - `USERBLOCK_USERS_TABLE` - Name of the accounts table
//! - `USERBLOCK_LOGGING_ENABLED` - Enable log output on stderr
//! - `USERBLOCK_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::blocker::{BatchMode, DEFAULT_GRACE_PERIOD_SECS};
use crate::errors::{BlockerError, BlockerResult};
use crate::store::database::{validate_table_name, DEFAULT_USERS_TABLE};

/// Global configuration singleton.
static CONFIG: OnceLock<UserblockConfig> = OnceLock::new();

/// Default config file name (extension resolved by the `config` crate).
pub const DEFAULT_CONFIG_FILE: &str = "config";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserblockConfig {
    /// Blocking rules
    pub blocker: BlockerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Blocking rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockerConfig {
    /// Seconds after creation before an unconfirmed account is blocked
    pub grace_period_secs: u64,
    /// Behavior of `batch-block` after an account that was not blocked
    pub batch_mode: BatchMode,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            batch_mode: BatchMode::StopOnSkip,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Table holding the accounts (integer Unix-second timestamps)
    pub users_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://userblock.db".to_string(),
            postgres_url: "postgres://localhost/userblock".to_string(),
            users_table: DEFAULT_USERS_TABLE.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> BlockerError {
    BlockerError::ConfigError(e.to_string())
}

impl UserblockConfig {
    /// Load configuration from `config.toml` (if present) and environment.
    pub fn load() -> BlockerResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from the given file (optional) and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. The config file, if it exists
    /// 3. Environment variables
    pub fn load_from(path: &str) -> BlockerResult<Self> {
        let defaults = Self::default();

        let builder = Config::builder()
            .set_default(
                "blocker.grace_period_secs",
                defaults.blocker.grace_period_secs,
            )
            .map_err(config_err)?
            .set_default("blocker.batch_mode", "stop_on_skip")
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_err)?
            .set_default("database.postgres_url", defaults.database.postgres_url)
            .map_err(config_err)?
            .set_default("database.users_table", defaults.database.users_table)
            .map_err(config_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .add_source(config::File::with_name(path).required(false))
            .set_override_option(
                "blocker.grace_period_secs",
                env::var("USERBLOCK_GRACE_PERIOD_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("blocker.batch_mode", env::var("USERBLOCK_BATCH_MODE").ok())
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("USERBLOCK_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("USERBLOCK_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("USERBLOCK_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option("database.users_table", env::var("USERBLOCK_USERS_TABLE").ok())
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env::var("USERBLOCK_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("USERBLOCK_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| BlockerError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| BlockerError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BlockerResult<()> {
        if self.blocker.grace_period_secs == 0 {
            return Err(BlockerError::ConfigError(
                "blocker.grace_period_secs must be greater than 0".to_string(),
            ));
        }
        if i64::try_from(self.blocker.grace_period_secs).is_err() {
            return Err(BlockerError::ConfigError(format!(
                "blocker.grace_period_secs is too large: {}",
                self.blocker.grace_period_secs
            )));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(BlockerError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        validate_table_name(&self.database.users_table)?;

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(BlockerError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> BlockerResult<&'static UserblockConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = UserblockConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    Ok(CONFIG.get_or_init(|| config))
}
