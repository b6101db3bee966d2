// Calibration report
// Measured accuracy and noise for one calibration session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::thresholds::ThresholdSet;
use crate::events::types::Point;
use crate::geometry::ScreenGeometry;

/// Result of one noise calibration, persisted with the experiment log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Fixation target the participant looked at
    pub target: Point,

    /// Samples that entered the statistics (after discarding the first)
    pub samples_used: usize,

    /// Mean absolute deviation from the target, per axis (px)
    pub accuracy_px: (f64, f64),

    /// Same deviation as a visual angle, per axis (degrees)
    pub accuracy_deg: (f64, f64),

    /// RMS of sample-to-sample differences, per axis (px)
    pub rms_noise_px: (f64, f64),

    /// Viewing distance used for the angular conversions (cm)
    pub viewing_distance_cm: f64,

    pub pixels_per_cm: f64,
}

impl CalibrationReport {
    pub fn new(
        target: Point,
        samples_used: usize,
        accuracy_px: (f64, f64),
        rms_noise_px: (f64, f64),
        geometry: &ScreenGeometry,
    ) -> Self {
        CalibrationReport {
            created_at: Utc::now(),
            target,
            samples_used,
            accuracy_px,
            accuracy_deg: (
                geometry.pix_to_deg(accuracy_px.0),
                geometry.pix_to_deg(accuracy_px.1),
            ),
            rms_noise_px,
            viewing_distance_cm: geometry.viewing_distance_cm,
            pixels_per_cm: geometry.pixels_per_cm(),
        }
    }

    /// Worst per-axis accuracy in degrees
    pub fn worst_accuracy_deg(&self) -> f64 {
        self.accuracy_deg.0.max(self.accuracy_deg.1)
    }

    /// Lines written to the experiment log after calibrating
    pub fn log_lines(&self, thresholds: &ThresholdSet) -> Vec<String> {
        vec![
            "calibration report start".to_string(),
            format!(
                "accuracy (in degrees): X={:.4}, Y={:.4}",
                self.accuracy_deg.0, self.accuracy_deg.1
            ),
            format!(
                "accuracy (in pixels): X={:.4}, Y={:.4}",
                self.accuracy_px.0, self.accuracy_px.1
            ),
            format!(
                "precision (RMS noise in pixels): X={:.4}, Y={:.4}",
                self.rms_noise_px.0, self.rms_noise_px.1
            ),
            format!(
                "distance between participant and display: {:.1} cm",
                self.viewing_distance_cm
            ),
            format!(
                "fixation threshold: {:.4} pixels",
                thresholds.fixation_tolerance_px
            ),
            format!(
                "speed threshold: {:.4} pixels/ms",
                thresholds.saccade_speed_px_per_ms
            ),
            format!(
                "acceleration threshold: {:.6} pixels/ms**2",
                thresholds.saccade_acceleration_px_per_ms2
            ),
            "calibration report end".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::thresholds::{derive_thresholds, DetectionConstants};

    #[test]
    fn test_report_converts_accuracy_to_degrees() {
        let geometry = ScreenGeometry::default();
        let report = CalibrationReport::new(
            Point::new(512.0, 384.0),
            20,
            (geometry.deg_to_pix(0.5), geometry.deg_to_pix(1.0)),
            (1.0, 1.0),
            &geometry,
        );

        assert!((report.accuracy_deg.0 - 0.5).abs() < 1e-3);
        assert!((report.accuracy_deg.1 - 1.0).abs() < 1e-3);
        assert!((report.worst_accuracy_deg() - 1.0).abs() < 1e-3);
        assert_eq!(report.viewing_distance_cm, 57.0);
    }

    #[test]
    fn test_log_lines_bracketed() {
        let geometry = ScreenGeometry::default();
        let report = CalibrationReport::new(Point::new(1.0, 1.0), 2, (0.0, 0.0), (1.0, 1.0), &geometry);
        let thresholds = derive_thresholds(&report, &geometry, &DetectionConstants::default());

        let lines = report.log_lines(&thresholds);
        assert_eq!(lines.first().unwrap(), "calibration report start");
        assert_eq!(lines.last().unwrap(), "calibration report end");
        assert!(lines.iter().any(|l| l.starts_with("precision (RMS noise in pixels)")));
    }

    #[test]
    fn test_report_json() {
        let report = CalibrationReport::new(
            Point::new(512.0, 384.0),
            15,
            (3.0, 4.0),
            (1.2, 0.8),
            &ScreenGeometry::default(),
        );

        let json = serde_json::to_string(&report).unwrap();
        let parsed: CalibrationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.created_at, report.created_at);
        assert_eq!(parsed.samples_used, 15);
        assert_eq!(parsed.target, report.target);
        assert!((parsed.pixels_per_cm - report.pixels_per_cm).abs() < 1e-9);
    }
}
