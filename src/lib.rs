// Gazeline - online gaze event detection
// Module declarations

pub mod calibration;
pub mod config;
pub mod drift;
pub mod events;
pub mod geometry;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod tracker;

pub use calibration::{
    derive_thresholds, run_calibration, Calibration, CalibrationError, CalibrationReport,
    DetectionConstants, NoiseSettings, ThresholdSet,
};
pub use config::{ConfigError, TrackerConfig};
pub use drift::{DriftCorrector, DriftMode, DriftOutcome, DriftSettings, RecalibrationReason};
pub use events::{
    CancelToken, Detection, EventDetector, EventKind, GazeEvent, GazePoint, Point, RawSample,
    WaitLimit,
};
pub use geometry::{GeometryError, ScreenGeometry};
pub use pipeline::Logger;
pub use session::{DriftCheck, EyeTracker, SessionError, SessionSummary};
pub use tracker::{Clock, SampleProvider, TrackerBackend, TrackerError, TrackerLink};
