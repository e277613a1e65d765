use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;
use crate::validate::validate;

/// Written to `config.toml` the first time the server starts.
const DEFAULT_CONFIG_CONTENT: &str = r#"# ldb debug server configuration
# Uncomment and edit settings below to override defaults.

# [server]
# bind = "127.0.0.1"
# port = 9999

# [debugger]
# break_without_client = false

# [demo]
# threads = 2
# step_delay_ms = 250
# script_name = "demo.lua"

# [log]
# level = "info"
# file = "/tmp/ldb.log"
"#;

/// Load `config_dir/config.toml`, creating it with commented-out defaults
/// when it does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or the first
/// validation failure.
pub fn load_config(config_dir: &Path) -> Result<Config, ConfigError> {
    let path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }
    if !path.exists() {
        std::fs::write(&path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("Created default config at {}", path.display());
    }

    let content = std::fs::read_to_string(&path)?;
    load_from_str(&content)
}

/// Load an explicitly named config file. Unlike [`load_config`] a missing
/// file is an error.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = load_from_str(&content)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse and validate a TOML string.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config).map_err(|errors| {
        for extra in errors.iter().skip(1) {
            tracing::warn!("{}", extra);
        }
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::invalid("unknown", "validation failed"))
    })?;
    Ok(config)
}
