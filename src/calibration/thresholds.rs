// Threshold derivation
// Turns a calibration report and angular constants into pixel-space thresholds

use serde::{Deserialize, Serialize};

use super::report::CalibrationReport;
use crate::geometry::ScreenGeometry;

/// Experimenter-chosen detection constants, in angular units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConstants {
    /// Maximal distance from the fixation anchor (degrees)
    pub fixation_tolerance_deg: f64,

    /// Time gaze has to stay within the tolerance to count as a fixation (ms)
    pub min_fixation_ms: f64,

    /// Saccade speed threshold (degrees per second)
    pub saccade_speed_deg_per_s: f64,

    /// Saccade acceleration threshold (degrees per second squared)
    pub saccade_acceleration_deg_per_s2: f64,

    /// Continuous missing data needed to confirm a blink (ms)
    pub blink_ms: f64,

    /// Noise-normalised squared distance a movement must exceed
    /// 1 admits anything above RMS noise, higher values only admit larger saccades
    pub weighted_distance: f64,

    /// Floor for the per-axis noise tolerance (px)
    pub min_noise_tolerance_px: f64,
}

impl Default for DetectionConstants {
    fn default() -> Self {
        DetectionConstants {
            fixation_tolerance_deg: 1.5,
            min_fixation_ms: 100.0,
            saccade_speed_deg_per_s: 35.0,
            saccade_acceleration_deg_per_s2: 9500.0,
            blink_ms: 150.0,
            weighted_distance: 10.0,
            min_noise_tolerance_px: 0.01,
        }
    }
}

/// Pixel-space thresholds used by the event detector
///
/// Built once per calibration and replaced as a whole on recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub fixation_tolerance_px: f64,
    pub saccade_speed_px_per_ms: f64,
    pub saccade_acceleration_px_per_ms2: f64,
    /// Per-axis RMS noise used to normalise saccade displacements
    pub noise_tolerance_px: (f64, f64),
    pub weighted_distance: f64,
    pub min_fixation_ms: f64,
    pub blink_ms: f64,
}

/// Derive detector thresholds from a calibration
///
/// Per-second constants are brought to the detector's millisecond time base
/// before conversion: speed is divided by 1e3, acceleration by 1e6.
pub fn derive_thresholds(
    report: &CalibrationReport,
    geometry: &ScreenGeometry,
    constants: &DetectionConstants,
) -> ThresholdSet {
    let floor = constants.min_noise_tolerance_px;
    let (rms_x, rms_y) = report.rms_noise_px;

    ThresholdSet {
        fixation_tolerance_px: geometry.deg_to_pix(constants.fixation_tolerance_deg),
        saccade_speed_px_per_ms: geometry.deg_to_pix(constants.saccade_speed_deg_per_s / 1_000.0),
        saccade_acceleration_px_per_ms2: geometry
            .deg_to_pix(constants.saccade_acceleration_deg_per_s2 / 1_000_000.0),
        noise_tolerance_px: (rms_x.max(floor), rms_y.max(floor)),
        weighted_distance: constants.weighted_distance,
        min_fixation_ms: constants.min_fixation_ms,
        blink_ms: constants.blink_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::Point;

    fn report(rms: (f64, f64)) -> CalibrationReport {
        CalibrationReport::new(
            Point::new(512.0, 384.0),
            12,
            (1.0, 1.0),
            rms,
            &ScreenGeometry::default(),
        )
    }

    #[test]
    fn test_per_second_constants_use_millisecond_base() {
        let geometry = ScreenGeometry::default();
        let constants = DetectionConstants::default();
        let thresholds = derive_thresholds(&report((1.5, 1.2)), &geometry, &constants);

        let expected_speed = geometry.deg_to_pix(0.035);
        let expected_accel = geometry.deg_to_pix(0.0095);
        assert!((thresholds.saccade_speed_px_per_ms - expected_speed).abs() < 1e-12);
        assert!((thresholds.saccade_acceleration_px_per_ms2 - expected_accel).abs() < 1e-12);

        // Roughly 0.9 px/ms and 0.24 px/ms^2 on the default setup
        assert!(thresholds.saccade_speed_px_per_ms > 0.8 && thresholds.saccade_speed_px_per_ms < 1.0);
        assert!(
            thresholds.saccade_acceleration_px_per_ms2 > 0.2
                && thresholds.saccade_acceleration_px_per_ms2 < 0.3
        );
    }

    #[test]
    fn test_noise_and_timing_carried_over() {
        let geometry = ScreenGeometry::default();
        let constants = DetectionConstants {
            blink_ms: 80.0,
            min_fixation_ms: 60.0,
            ..DetectionConstants::default()
        };
        let thresholds = derive_thresholds(&report((1.5, 1.2)), &geometry, &constants);

        assert_eq!(thresholds.noise_tolerance_px, (1.5, 1.2));
        assert_eq!(thresholds.blink_ms, 80.0);
        assert_eq!(thresholds.min_fixation_ms, 60.0);
        assert_eq!(thresholds.weighted_distance, 10.0);
        assert!((thresholds.fixation_tolerance_px - geometry.deg_to_pix(1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_noise_is_floored() {
        let thresholds = derive_thresholds(
            &report((0.0, 2.0)),
            &ScreenGeometry::default(),
            &DetectionConstants::default(),
        );
        assert_eq!(thresholds.noise_tolerance_px, (0.01, 2.0));
    }
}
