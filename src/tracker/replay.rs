// Replay tracker
// Plays back the sample rows of a previously written sample log

use std::path::Path;
use std::thread;
use std::time::Duration;

use super::{Clock, MonotonicClock, TrackerError, TrackerLink};
use crate::events::types::RawSample;
use crate::pipeline::sample_log::{read_sample_log, LogRecord};

/// Replays recorded samples at their original pace
///
/// Timestamps are shifted so the first recorded sample lands on the clock
/// time of the first `receive`. Message rows are skipped.
pub struct ReplayLink {
    samples: Vec<RawSample>,
    cursor: usize,
    clock: MonotonicClock,
    offset_ms: Option<f64>,
    paced: bool,
}

impl ReplayLink {
    pub fn new(samples: Vec<RawSample>, clock: MonotonicClock) -> Self {
        ReplayLink {
            samples,
            cursor: 0,
            clock,
            offset_ms: None,
            paced: true,
        }
    }

    /// Load the sample rows of a sample log
    pub fn open(path: &Path, clock: MonotonicClock) -> Result<Self, TrackerError> {
        let records = read_sample_log(path).map_err(|e| {
            TrackerError::StartFailed(format!("cannot replay {}: {}", path.display(), e))
        })?;

        let samples: Vec<RawSample> = records
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Sample(sample) => Some(sample),
                LogRecord::Message { .. } => None,
            })
            .collect();

        if samples.is_empty() {
            return Err(TrackerError::StartFailed(format!(
                "{} contains no samples",
                path.display()
            )));
        }

        log::info!("Replaying {} samples from {}", samples.len(), path.display());
        Ok(Self::new(samples, clock))
    }

    /// Deliver samples as fast as they are requested
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.cursor
    }
}

impl TrackerLink for ReplayLink {
    fn receive(&mut self) -> Result<RawSample, TrackerError> {
        let mut sample = *self
            .samples
            .get(self.cursor)
            .ok_or_else(|| TrackerError::Disconnected("replay finished".to_string()))?;
        self.cursor += 1;

        let offset = *self
            .offset_ms
            .get_or_insert_with(|| self.clock.now_ms() - sample.time_ms);
        sample.time_ms += offset;

        if self.paced {
            let wait_ms = sample.time_ms - self.clock.now_ms();
            if wait_ms > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait_ms / 1000.0));
            }
        }

        Ok(sample)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::Point;
    use crate::pipeline::{Logger, SampleLog};
    use tempfile::TempDir;

    #[test]
    fn test_replays_samples_and_skips_messages() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.tsv");

        let log = SampleLog::create(&path, 60).unwrap();
        log.sample(RawSample::binocular(100.0, Point::new(1.0, 2.0), 3.0));
        log.message(105.0, "TRIAL 1");
        log.sample(RawSample::missing(110.0));
        log.sample(RawSample::binocular(120.0, Point::new(5.0, 6.0), 3.0));
        log.close().unwrap();

        let clock = MonotonicClock::start();
        let mut link = ReplayLink::open(&path, clock).unwrap();
        assert_eq!(link.remaining(), 3);

        let first = link.receive().unwrap();
        let second = link.receive().unwrap();
        let third = link.receive().unwrap();

        assert_eq!(first.gaze_point().position, Some(Point::new(1.0, 2.0)));
        assert!(!second.gaze_point().is_valid());
        assert!((second.time_ms - first.time_ms - 10.0).abs() < 1e-6);
        assert!((third.time_ms - first.time_ms - 20.0).abs() < 1e-6);
        assert!(clock.now_ms() >= third.time_ms - 1.0);

        assert!(matches!(link.receive(), Err(TrackerError::Disconnected(_))));
    }

    #[test]
    fn test_missing_file_fails_to_start() {
        let clock = MonotonicClock::start();
        let result = ReplayLink::open(Path::new("/nonexistent/session.tsv"), clock);
        assert!(matches!(result, Err(TrackerError::StartFailed(_))));
    }
}
