// Tracker module
// Capabilities the detection core consumes: sample provider, clock, raw link

pub mod backend;
pub mod clock;
pub mod input;
pub mod replay;
pub mod scripted;
pub mod simulated;
pub mod slot;
pub mod stream;

pub use backend::{BackendConfig, BackendKind, TrackerBackend};
pub use clock::MonotonicClock;
pub use input::{ChannelInput, InputPoller, InputSignal, ScriptedInput};
pub use replay::ReplayLink;
pub use scripted::{ScriptClock, ScriptedTracker};
pub use simulated::{SimulatedGaze, SimulatedLink};
pub use slot::LatestSample;
pub use stream::{GazeStream, StreamReader};

use thiserror::Error;

use crate::events::types::{GazePoint, RawSample};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    /// The tracker stopped delivering data; fatal to the session
    #[error("Tracker disconnected: {0}")]
    Disconnected(String),

    #[error("Failed to start tracker: {0}")]
    StartFailed(String),
}

/// Returns the most recent gaze point, or the invalid marker
///
/// Must not block for longer than roughly one hardware sample interval.
pub trait SampleProvider {
    fn sample(&mut self) -> Result<GazePoint, TrackerError>;
}

impl<P: SampleProvider + ?Sized> SampleProvider for &mut P {
    fn sample(&mut self) -> Result<GazePoint, TrackerError> {
        (**self).sample()
    }
}

/// Monotonic milliseconds relative to the experiment-start epoch
pub trait Clock {
    fn now_ms(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> f64 {
        (**self).now_ms()
    }
}

/// Vendor-facing side of a tracker: a blocking source of raw samples
///
/// Each backend only has to provide this; detection, calibration and
/// logging are shared.
pub trait TrackerLink {
    /// Block until the next sample arrives (at most about one sample interval)
    fn receive(&mut self) -> Result<RawSample, TrackerError>;

    /// Short name used in logs and the session record
    fn name(&self) -> &str;
}

impl TrackerLink for Box<dyn TrackerLink + Send> {
    fn receive(&mut self) -> Result<RawSample, TrackerError> {
        (**self).receive()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Synchronous pull: the caller's thread reads the link directly
pub struct DirectSource<L: TrackerLink> {
    link: L,
}

impl<L: TrackerLink> DirectSource<L> {
    pub fn new(link: L) -> Self {
        DirectSource { link }
    }

    pub fn into_inner(self) -> L {
        self.link
    }
}

impl<L: TrackerLink> SampleProvider for DirectSource<L> {
    fn sample(&mut self) -> Result<GazePoint, TrackerError> {
        self.link.receive().map(|raw| raw.gaze_point())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ThresholdSet;
    use crate::events::detector::EventDetector;
    use crate::events::types::{EventKind, Point};
    use crate::events::wait::WaitLimit;

    fn detector() -> EventDetector {
        EventDetector::new(ThresholdSet {
            fixation_tolerance_px: 38.0,
            saccade_speed_px_per_ms: 0.9,
            saccade_acceleration_px_per_ms2: 0.25,
            noise_tolerance_px: (1.5, 1.5),
            weighted_distance: 10.0,
            min_fixation_ms: 100.0,
            blink_ms: 150.0,
        })
    }

    #[test]
    fn test_direct_source_drives_detector() {
        let tracker = ScriptedTracker::new(1000.0)
            .then_fixate((400.0, 300.0), 120.0)
            .then_gap(160.0)
            .then_point(400.0, 300.0);
        let clock = tracker.clock();
        let mut source = DirectSource::new(tracker);
        let detector = detector();

        let fixation = detector
            .wait_for_fixation_start(&mut source, &clock, &WaitLimit::unbounded())
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(fixation.kind, EventKind::FixationStart);
        assert_eq!(fixation.position, Some(Point::new(400.0, 300.0)));

        let blink = detector
            .wait_for_blink_start(&mut source, &clock, &WaitLimit::unbounded())
            .unwrap()
            .found()
            .unwrap();
        assert!((blink.time_ms - 120.0).abs() < 1e-6);

        let tracker = source.into_inner();
        assert!(tracker.remaining() > 0);
    }

    #[test]
    fn test_direct_source_reports_disconnect() {
        let mut source = DirectSource::new(ScriptedTracker::new(1000.0).then_point(1.0, 1.0));

        assert!(source.sample().unwrap().is_valid());
        assert!(matches!(source.sample(), Err(TrackerError::Disconnected(_))));
    }
}
