//! Configuration for the streaming decode server
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (W2LSERVE_ prefix)

pub mod settings;

pub use settings::{
    load_settings, EngineConfig, ObservabilityConfig, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
