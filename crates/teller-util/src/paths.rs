//! Default paths for teller components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$TELLER_CONFIG`, `$XDG_CONFIG_HOME/teller/config.toml` or `~/.config/teller/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the configuration file path
pub const TELLER_CONFIG_ENV: &str = "TELLER_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "teller";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$TELLER_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/teller/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/teller/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(TELLER_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the TELLER_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_contains_teller() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains("teller"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
