use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, parsing, or validating the server config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// The default config file could not be written.
    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    /// The file is not valid TOML or does not match the schema.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A value is outside its allowed range.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// Dotted path of the offending field, e.g. `server.port`.
        field: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
