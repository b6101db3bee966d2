// Calibration module
// Noise calibration, reports and threshold derivation

pub mod noise;
pub mod report;
pub mod thresholds;

pub use noise::{measure_noise, NoiseMeasurement, NoiseSettings};
pub use report::CalibrationReport;
pub use thresholds::{derive_thresholds, DetectionConstants, ThresholdSet};

use thiserror::Error;

use crate::events::types::Point;
use crate::events::wait::WaitLimit;
use crate::geometry::ScreenGeometry;
use crate::tracker::{Clock, SampleProvider, TrackerError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Insufficient calibration data: {collected} usable samples")]
    InsufficientData { collected: usize },

    #[error("Calibration accuracy too low: {accuracy_deg:.2} deg (limit {limit_deg:.2} deg)")]
    AccuracyTooLow { accuracy_deg: f64, limit_deg: f64 },

    #[error("Calibration aborted")]
    Aborted,

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl CalibrationError {
    /// Whether calling calibration again is the expected recovery
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CalibrationError::Tracker(_))
    }
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// A finished calibration: the report and the thresholds derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub report: CalibrationReport,
    pub thresholds: ThresholdSet,
}

/// Measure noise on `target` and derive a fresh threshold set
pub fn run_calibration<P, C>(
    source: &mut P,
    clock: &C,
    target: Point,
    geometry: &ScreenGeometry,
    settings: &NoiseSettings,
    constants: &DetectionConstants,
    limit: &WaitLimit,
) -> CalibrationResult<Calibration>
where
    P: SampleProvider + ?Sized,
    C: Clock + ?Sized,
{
    let measurement = measure_noise(source, clock, target, settings, limit)?;
    let report = CalibrationReport::new(
        target,
        measurement.samples_used,
        measurement.accuracy_px,
        measurement.rms_noise_px,
        geometry,
    );

    if let Some(limit_deg) = settings.max_accuracy_deg {
        let accuracy_deg = report.worst_accuracy_deg();
        if accuracy_deg > limit_deg {
            log::warn!(
                "Calibration rejected: accuracy {:.2} deg exceeds {:.2} deg",
                accuracy_deg,
                limit_deg
            );
            return Err(CalibrationError::AccuracyTooLow {
                accuracy_deg,
                limit_deg,
            });
        }
    }

    let thresholds = derive_thresholds(&report, geometry, constants);
    log::info!(
        "Derived thresholds: fixation {:.1} px, speed {:.3} px/ms, accel {:.4} px/ms2",
        thresholds.fixation_tolerance_px,
        thresholds.saccade_speed_px_per_ms,
        thresholds.saccade_acceleration_px_per_ms2
    );

    Ok(Calibration { report, thresholds })
}
