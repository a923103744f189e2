// src/config.rs
//! Configuration stored as JSON under the user's config directory

use crate::arbiter::ArbiterConfig;
use crate::compass::CompassConfig;
use crate::error::{LocationError, Result};
use crate::gps::{gpsd, nmea};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUIRED_ACCURACY_M: f64 = 50.0;
pub const DEFAULT_MAX_RUN_TIME_MS: u64 = 60_000;

/// Which receiver backs the fallback provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub source_type: String, // "gpsd", "serial"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(nmea::DEFAULT_BAUDRATE),
            gpsd_host: Some(gpsd::DEFAULT_GPSD_HOST.to_string()),
            gpsd_port: Some(gpsd::DEFAULT_GPSD_PORT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub arbiter: ArbiterConfig,
    pub compass: CompassConfig,
    pub fallback: FallbackConfig,
    /// Accuracy at which a one-shot locate stops early.
    pub required_accuracy_m: f64,
    /// Longest a one-shot locate may run.
    pub max_run_time_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            arbiter: ArbiterConfig::default(),
            compass: CompassConfig::default(),
            fallback: FallbackConfig::default(),
            required_accuracy_m: DEFAULT_REQUIRED_ACCURACY_M,
            max_run_time_ms: DEFAULT_MAX_RUN_TIME_MS,
        }
    }
}

impl LocationConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| LocationError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| LocationError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LocationError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| LocationError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| LocationError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// `$HOME/.config/location-lib/config.json`
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| LocationError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("location-lib").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        match self.fallback.source_type.as_str() {
            "gpsd" => {}
            "serial" if self.fallback.serial_port.is_none() => {
                return Err(LocationError::Config("serial fallback needs serial_port".to_string()));
            }
            "serial" => {}
            other => {
                return Err(LocationError::Config(format!("unknown fallback source type: {}", other)));
            }
        }
        if !(self.required_accuracy_m.is_finite() && self.required_accuracy_m > 0.0) {
            return Err(LocationError::Config(format!(
                "required_accuracy_m must be positive, got {}",
                self.required_accuracy_m
            )));
        }
        Ok(())
    }

    pub fn max_run_time(&self) -> Duration {
        Duration::from_millis(self.max_run_time_ms)
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.fallback.source_type = "serial".to_string();
        self.fallback.serial_port = Some(port);
        self.fallback.serial_baudrate = Some(baudrate);
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.fallback.source_type = "gpsd".to_string();
        self.fallback.gpsd_host = Some(host);
        self.fallback.gpsd_port = Some(port);
    }
}
