//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: Where the http api listens.
//!     - DeviceConfig: Which sensor device the host follows by default.
//!     - AcquisitionConfig: Reading source and window timing.
//!     - AdvisorConfig: The generative model used for storage advice.
//!     - WeatherConfig: Forecast and reverse-geocoding endpoints.
//!     - FirestoreConfig: Optional cloud document mirror.
//!     - LoggingConfig: Log level and per-reading output.
//!
//! every section carries defaults, so a partial file only overrides
//! what it names.
//!
//! ==============================================================================

use crate::acquisition::SourceKind;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub acquisition: AcquisitionConfig,
    pub advisor: AdvisorConfig,
    pub weather: WeatherConfig,
    pub firestore: FirestoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: 3000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { id: "device_A4B2".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub source: SourceKind,
    pub tick_millis: u64,
    /// polled readings at least this old are discarded
    pub stale_after_seconds: u64,
    /// sensor endpoint for the polled source; defaults to this host's own
    pub poll_url: Option<String>,
    /// abandon a window that has not completed in time (unset = wait forever)
    pub max_window_seconds: Option<u64>,
    /// seed for the simulated source (unset = entropy)
    pub seed: Option<u64>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Simulated,
            tick_millis: 1000,
            stale_after_seconds: 30,
            poll_url: None,
            max_window_seconds: None,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdvisorConfig {
    /// ollama server address
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "gemma3:1b".to_string(),
            temperature: 0.1,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    pub forecast_url: String,
    pub geocode_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            geocode_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            user_agent: "GrainMoistureApp/1.0".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FirestoreConfig {
    pub enabled: bool,
    pub project_id: String,
    pub api_key: String,
    pub collection: String,
    pub poll_millis: u64,
    /// override for the firestore rest root (emulators, tests)
    pub base_url: String,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            api_key: String::new(),
            collection: "live_reading".to_string(),
            poll_millis: 1000,
            base_url: "https://firestore.googleapis.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

/// where the active configuration came from.
/// logging is not up yet when the file is read, so this is reported afterwards.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
    Invalid { path: PathBuf, error: String },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
            ConfigSource::Defaults => {
                tracing::warn!("[CONFIG] No config file found - using defaults")
            }
            ConfigSource::Invalid { path, error } => {
                tracing::warn!(
                    "[CONFIG] Failed to load {}: {} - using defaults",
                    path.display(),
                    error
                )
            }
        }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load with default fallback
    pub fn load_or_default() -> (Self, ConfigSource) {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in paths {
            if path.exists() {
                return match Self::load(&path) {
                    Ok(config) => (config, ConfigSource::File(path)),
                    Err(e) => {
                        let error = format!("{:#}", e);
                        (Self::default(), ConfigSource::Invalid { path, error })
                    }
                };
            }
        }

        (Self::default(), ConfigSource::Defaults)
    }

    /// sensor endpoint the polled source reads from
    pub fn poll_url(&self) -> String {
        self.acquisition.poll_url.clone().unwrap_or_else(|| {
            format!("http://127.0.0.1:{}/api/sensor?deviceId={}", self.server.port, self.device.id)
        })
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("[CONFIG] Listen: {}:{}", self.server.bind, self.server.port);
        tracing::info!("[CONFIG] Device: {}", self.device.id);
        tracing::info!(
            "[CONFIG] Source: {:?} ({}ms ticks)",
            self.acquisition.source,
            self.acquisition.tick_millis
        );
        tracing::info!("[CONFIG] Advisor: {} @ {}", self.advisor.model, self.advisor.base_url);
        tracing::info!(
            "[CONFIG] Firestore mirror: {}",
            if self.firestore.enabled { "enabled" } else { "disabled" }
        );
        tracing::info!("[CONFIG] Log Level: {}", self.logging.level);
    }
}
