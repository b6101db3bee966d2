// Event detection module
// Gaze samples, detected events and the online detector

pub mod detector;
pub mod types;
pub mod wait;

pub use detector::{DetectionResult, EventDetector};
pub use types::{EventKind, EyeSample, GazeEvent, GazePoint, Point, RawSample};
pub use wait::{CancelToken, Detection, Interrupt, WaitLimit};
