//! Configuration management for the stroke risk service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub listen_addr: String,
    /// Largest request body accepted by `/predict`, in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Locations of the trained artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// ONNX export of the trained network
    pub model_path: PathBuf,
    /// Scaler manifest (feature names, means, scales) as JSON
    pub manifest_path: PathBuf,
    /// Number of intra-op threads for ONNX inference
    pub onnx_threads: usize,
    /// The model emits logits rather than probabilities
    pub model_outputs_logits: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("artifacts/stroke_model.onnx"),
            manifest_path: PathBuf::from("artifacts/scaler.json"),
            onnx_threads: 1,
            model_outputs_logits: false,
        }
    }
}

/// Periodic metrics reporting
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::from_env()
        }
    }

    /// Load configuration from a specific path.
    ///
    /// `STROKE__<SECTION>__<KEY>` environment variables override file values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Defaults plus environment overrides, without a file.
    pub fn from_env() -> Result<Self> {
        Config::builder()
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("STROKE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
