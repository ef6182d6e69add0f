//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Decoding engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.chunk_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.chunk_ms".to_string(),
                message: "chunk size must be non-zero".to_string(),
            });
        }

        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.idle_timeout_secs".to_string(),
                message: "idle timeout must be non-zero".to_string(),
            });
        }

        if self.session.reap_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.reap_interval_secs".to_string(),
                message: "reap interval must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5005
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Decoding engine configuration
///
/// The engine is a stateful streaming decoder loaded as a shared library at
/// startup. The three model files must exist on disk before the context is
/// created; their absence is a startup error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shared library path. Empty means "resolve the platform default name
    /// from the working directory".
    #[serde(default)]
    pub library: String,

    /// Feature extractor model path
    #[serde(default = "default_feature_extractor")]
    pub feature_extractor: String,

    /// Acoustic model path
    #[serde(default = "default_acoustic_model")]
    pub acoustic_model: String,

    /// Token list path (one token per line)
    #[serde(default = "default_tokens")]
    pub tokens: String,

    /// Feed granularity in milliseconds at 16 kHz
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u32,
}

fn default_feature_extractor() -> String {
    "feature_extractor.bin".to_string()
}
fn default_acoustic_model() -> String {
    "acoustic_model.bin".to_string()
}
fn default_tokens() -> String {
    "tokens.txt".to_string()
}
fn default_chunk_ms() -> u32 {
    500
}

impl EngineConfig {
    /// Engine feed granularity in samples at 16 kHz
    pub fn chunk_samples(&self) -> usize {
        (self.chunk_ms as usize) * 16_000 / 1_000
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library: String::new(),
            feature_extractor: default_feature_extractor(),
            acoustic_model: default_acoustic_model(),
            tokens: default_tokens(),
            chunk_ms: default_chunk_ms(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds between reaper passes
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_idle_timeout() -> u64 {
    30
}
fn default_reap_interval() -> u64 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (W2LSERVE_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("W2LSERVE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 5005);
        assert_eq!(settings.engine.chunk_ms, 500);
        assert_eq!(settings.session.idle_timeout_secs, 30);
    }

    #[test]
    fn test_chunk_samples() {
        let engine = EngineConfig::default();
        // 500 ms at 16 kHz
        assert_eq!(engine.chunk_samples(), 8000);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.engine.chunk_ms = 0;
        assert!(settings.validate().is_err());

        settings.engine.chunk_ms = 500;
        assert!(settings.validate().is_ok());

        settings.session.idle_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }
}
