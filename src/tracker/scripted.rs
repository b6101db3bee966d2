// Scripted gaze source
// Deterministic sample-and-clock script for synchronous pull and tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Clock, SampleProvider, TrackerError, TrackerLink};
use crate::events::types::{GazePoint, Point, RawSample};

/// Clock that reads the timestamp of the last sample a ScriptedTracker delivered
#[derive(Debug, Clone)]
pub struct ScriptClock {
    bits: Arc<AtomicU64>,
}

impl ScriptClock {
    fn set(&self, time_ms: f64) {
        self.bits.store(time_ms.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ScriptClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Replays a fixed list of gaze points, one per `sample()` call
///
/// Time only advances when a sample is delivered, so detection results are
/// exactly reproducible. Once the script runs out every further call reports
/// `TrackerError::Disconnected`.
#[derive(Debug, Clone)]
pub struct ScriptedTracker {
    points: Vec<GazePoint>,
    cursor: usize,
    interval_ms: f64,
    clock: ScriptClock,
}

impl ScriptedTracker {
    /// Empty script sampled at `sample_rate_hz`
    pub fn new(sample_rate_hz: f64) -> Self {
        ScriptedTracker {
            points: Vec::new(),
            cursor: 0,
            interval_ms: 1000.0 / sample_rate_hz,
            clock: ScriptClock {
                bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            },
        }
    }

    /// Script made of explicit, already timestamped points
    pub fn from_points(points: Vec<GazePoint>) -> Self {
        let interval_ms = match points.as_slice() {
            [a, b, ..] => (b.time_ms - a.time_ms).max(f64::EPSILON),
            _ => 1.0,
        };
        ScriptedTracker {
            points,
            cursor: 0,
            interval_ms,
            clock: ScriptClock {
                bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            },
        }
    }

    fn next_time(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.time_ms + self.interval_ms)
            .unwrap_or(0.0)
    }

    /// Append one valid sample at the next sample time
    pub fn then_point(mut self, x: f64, y: f64) -> Self {
        let t = self.next_time();
        self.points.push(GazePoint::valid(t, x, y));
        self
    }

    /// Append a sequence of valid samples
    pub fn then_points(mut self, points: &[(f64, f64)]) -> Self {
        for &(x, y) in points {
            self = self.then_point(x, y);
        }
        self
    }

    /// Hold gaze perfectly still on `at` for at least `duration_ms`
    pub fn then_fixate(mut self, at: (f64, f64), duration_ms: f64) -> Self {
        let count = (duration_ms / self.interval_ms).ceil().max(1.0) as usize;
        for _ in 0..count {
            self = self.then_point(at.0, at.1);
        }
        self
    }

    /// Append invalid samples covering at least `duration_ms`
    pub fn then_gap(mut self, duration_ms: f64) -> Self {
        let count = (duration_ms / self.interval_ms).ceil().max(1.0) as usize;
        for _ in 0..count {
            let t = self.next_time();
            self.points.push(GazePoint::invalid(t));
        }
        self
    }

    /// Clock that follows this script
    pub fn clock(&self) -> ScriptClock {
        self.clock.clone()
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Samples not delivered yet
    pub fn remaining(&self) -> usize {
        self.points.len() - self.cursor
    }

    pub fn points(&self) -> &[GazePoint] {
        &self.points
    }

    fn advance(&mut self) -> Result<GazePoint, TrackerError> {
        let point = self
            .points
            .get(self.cursor)
            .copied()
            .ok_or_else(|| TrackerError::Disconnected("script exhausted".to_string()))?;
        self.cursor += 1;
        self.clock.set(point.time_ms);
        Ok(point)
    }
}

impl SampleProvider for ScriptedTracker {
    fn sample(&mut self) -> Result<GazePoint, TrackerError> {
        self.advance()
    }
}

impl TrackerLink for ScriptedTracker {
    fn receive(&mut self) -> Result<RawSample, TrackerError> {
        let point = self.advance()?;
        Ok(match point.position {
            Some(Point { x, y }) => RawSample::binocular(point.time_ms, Point::new(x, y), 0.0),
            None => RawSample::missing(point.time_ms),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_timing() {
        let mut tracker = ScriptedTracker::new(100.0)
            .then_fixate((10.0, 10.0), 30.0)
            .then_gap(20.0)
            .then_point(50.0, 50.0);
        let clock = tracker.clock();

        assert_eq!(tracker.remaining(), 6);
        let first = tracker.sample().unwrap();
        assert_eq!(first.time_ms, 0.0);
        assert_eq!(clock.now_ms(), 0.0);

        let times: Vec<f64> = (0..5).map(|_| tracker.sample().unwrap().time_ms).collect();
        assert_eq!(times, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(clock.now_ms(), 50.0);
    }

    #[test]
    fn test_exhausted_script_disconnects() {
        let mut tracker = ScriptedTracker::new(60.0).then_point(1.0, 2.0);
        assert!(tracker.sample().is_ok());
        assert!(matches!(
            tracker.sample(),
            Err(TrackerError::Disconnected(_))
        ));
    }

    #[test]
    fn test_gap_samples_are_invalid() {
        let mut tracker = ScriptedTracker::new(1000.0).then_gap(3.0);
        for _ in 0..3 {
            assert!(!tracker.sample().unwrap().is_valid());
        }
    }

    #[test]
    fn test_link_yields_raw_samples() {
        let mut tracker = ScriptedTracker::new(1000.0).then_point(5.0, 6.0).then_gap(1.0);
        let raw = tracker.receive().unwrap();
        assert_eq!(raw.gaze_point().position, Some(Point::new(5.0, 6.0)));
        assert!(!tracker.receive().unwrap().gaze_point().is_valid());
    }
}
