//! Rule data parsing and validation for the teller kiosk engine
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Per-state transition tables with guards, after-effects and fallbacks
//! - Named timeouts, counters and flags
//! - Validation that reports every problem at once

mod expr;
mod rules;
mod schema;
mod validation;

pub use expr::*;
pub use rules::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(
        path = %path.display(),
        states = config.rules.state_count(),
        transitions = config.rules.transition_count(),
        "Loaded rule data"
    );
    Ok(config)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Config::from_raw(raw).map_err(|e| ConfigError::ValidationFailed { errors: vec![e] })
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
