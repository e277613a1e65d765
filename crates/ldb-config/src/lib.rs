pub mod config;
pub mod error;
pub mod load;
pub mod paths;
pub mod validate;

pub use config::{Config, DebuggerConfig, DemoConfig, LogConfig, LogLevel, ServerConfig};
pub use error::ConfigError;
pub use load::{load_config, load_from_path, load_from_str};
