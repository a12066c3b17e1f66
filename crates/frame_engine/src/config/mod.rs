//! Configuration system
//!
//! File-backed settings for the frame engine. Any [`Config`] type loads from and
//! saves to TOML or RON, chosen by file extension.

use std::str::FromStr;

pub use serde::{Deserialize, Serialize};

mod camera;
mod renderer;

pub use camera::CameraConfig;
pub use renderer::{DescriptorPoolConfig, RendererConfig};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default()).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback level when `RUST_LOG` is unset (`error` ... `trace`, or `off`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Parsed level filter
    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

/// Install the global `env_logger`
///
/// `RUST_LOG` directives override the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let level = config.level_filter()?;
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame protocol settings
    pub renderer: RendererConfig,
    /// Windowed viewport camera
    pub camera: CameraConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate()?;
        self.camera.validate()?;
        self.logging.level_filter().map(|_| ())
    }
}
