// Latest-sample slot shared between the receive thread and detection
use std::sync::{Arc, Mutex, PoisonError};

use super::TrackerError;
use crate::events::types::GazePoint;

#[derive(Debug, Default)]
struct SlotState {
    latest: Option<GazePoint>,
    failure: Option<TrackerError>,
}

/// Single mutex-guarded cell holding the newest gaze point
///
/// Readers and the writer lock it for the full (tiny) critical section; a
/// read is lossy and may skip or repeat samples relative to the tracker rate.
#[derive(Debug, Clone, Default)]
pub struct LatestSample {
    inner: Arc<Mutex<SlotState>>,
}

impl LatestSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a newer point
    pub fn publish(&self, point: GazePoint) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Keep timestamps non-decreasing for readers
        match state.latest {
            Some(prev) if point.time_ms < prev.time_ms => {
                log::debug!(
                    "Dropping out-of-order sample at {:.3} ms (latest {:.3} ms)",
                    point.time_ms,
                    prev.time_ms
                );
            }
            _ => state.latest = Some(point),
        }
    }

    /// Record that the producer can no longer deliver data
    pub fn fail(&self, error: TrackerError) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure = Some(error);
    }

    /// Read the newest point
    /// Before the first sample arrives this is the invalid marker at `now_ms`
    pub fn read(&self, now_ms: f64) -> Result<GazePoint, TrackerError> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        Ok(state.latest.unwrap_or_else(|| GazePoint::invalid(now_ms)))
    }

    pub fn is_failed(&self) -> bool {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_reads_invalid() {
        let slot = LatestSample::new();
        let point = slot.read(12.0).unwrap();
        assert!(!point.is_valid());
        assert_eq!(point.time_ms, 12.0);
    }

    #[test]
    fn test_publish_overwrites_and_ignores_older() {
        let slot = LatestSample::new();
        slot.publish(GazePoint::valid(10.0, 1.0, 1.0));
        slot.publish(GazePoint::valid(20.0, 2.0, 2.0));
        slot.publish(GazePoint::valid(15.0, 3.0, 3.0));

        let point = slot.read(0.0).unwrap();
        assert_eq!(point, GazePoint::valid(20.0, 2.0, 2.0));
    }

    #[test]
    fn test_failure_is_reported_to_readers() {
        let slot = LatestSample::new();
        let reader = slot.clone();
        slot.publish(GazePoint::valid(1.0, 1.0, 1.0));
        slot.fail(TrackerError::Disconnected("cable".to_string()));

        assert!(reader.is_failed());
        assert_eq!(
            reader.read(2.0),
            Err(TrackerError::Disconnected("cable".to_string()))
        );
    }
}
