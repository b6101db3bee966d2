// Tracker configuration
// JSON-loadable settings for display, detection, calibration, drift, logging and backend

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::{DetectionConstants, NoiseSettings};
use crate::drift::DriftSettings;
use crate::geometry::{GeometryError, ScreenGeometry};
use crate::pipeline::sample_log::DEFAULT_FLUSH_EVERY;
use crate::tracker::BackendConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid display: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Where session directories go; the app data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Write the per-sample TSV log
    pub sample_log: bool,

    /// Rows between sample log flushes
    pub flush_every: usize,

    /// Write the JSONL session trace
    pub trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            data_dir: None,
            sample_log: true,
            flush_every: DEFAULT_FLUSH_EVERY,
            trace: true,
        }
    }
}

/// Complete tracker configuration
///
/// Every section is optional in JSON and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    pub display: ScreenGeometry,
    pub detection: DetectionConstants,
    pub calibration: NoiseSettings,
    pub drift: DriftSettings,
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be > 0 (got {})", name, value)))
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded tracker configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject non-physical or inconsistent values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.display.validate()?;

        let d = &self.detection;
        positive("detection.fixation_tolerance_deg", d.fixation_tolerance_deg)?;
        positive("detection.saccade_speed_deg_per_s", d.saccade_speed_deg_per_s)?;
        positive(
            "detection.saccade_acceleration_deg_per_s2",
            d.saccade_acceleration_deg_per_s2,
        )?;
        positive("detection.weighted_distance", d.weighted_distance)?;
        positive("detection.min_noise_tolerance_px", d.min_noise_tolerance_px)?;
        if !(d.min_fixation_ms >= 0.0) || !(d.blink_ms >= 0.0) {
            return Err(ConfigError::Invalid(
                "detection durations must be >= 0".to_string(),
            ));
        }

        let c = &self.calibration;
        if c.min_samples < 2 {
            return Err(ConfigError::Invalid(
                "calibration.min_samples must be >= 2".to_string(),
            ));
        }
        positive("calibration.max_duration_ms", c.max_duration_ms)?;
        if !(c.settle_ms >= 0.0) || !(c.min_duration_ms >= 0.0) {
            return Err(ConfigError::Invalid(
                "calibration durations must be >= 0".to_string(),
            ));
        }
        if c.min_duration_ms > c.max_duration_ms {
            return Err(ConfigError::Invalid(format!(
                "calibration.min_duration_ms ({}) exceeds max_duration_ms ({})",
                c.min_duration_ms, c.max_duration_ms
            )));
        }
        if let Some(limit) = c.max_accuracy_deg {
            positive("calibration.max_accuracy_deg", limit)?;
        }

        let drift = &self.drift;
        positive("drift.error_distance_deg", drift.error_distance_deg)?;
        positive("drift.timeout_ms", drift.timeout_ms)?;
        positive("drift.max_deviation_px", drift.max_deviation_px)?;
        positive("drift.reset_threshold_px", drift.reset_threshold_px)?;
        if drift.max_attempts == 0 || drift.min_samples == 0 {
            return Err(ConfigError::Invalid(
                "drift.max_attempts and drift.min_samples must be >= 1".to_string(),
            ));
        }

        if self.logging.flush_every == 0 {
            return Err(ConfigError::Invalid(
                "logging.flush_every must be >= 1".to_string(),
            ));
        }

        positive("backend.sample_rate_hz", self.backend.sample_rate_hz)?;
        Ok(())
    }
}
