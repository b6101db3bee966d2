// Tracker backend selection
// One backend variant is chosen when the session is opened

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{MonotonicClock, ReplayLink, SimulatedLink, TrackerError, TrackerLink};
use crate::events::types::{Point, RawSample};

/// Backend type named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Noisy synthetic gaze, for piloting experiments without hardware
    Simulated,

    /// Playback of a recorded sample log
    Replay,
}

/// Backend section of the tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    pub sample_rate_hz: f64,

    /// Standard deviation of simulated gaze noise (px)
    pub noise_px: f64,

    /// Sample log to play back with `BackendKind::Replay`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::Simulated,
            sample_rate_hz: 500.0,
            noise_px: 1.0,
            replay_path: None,
        }
    }
}

/// The tracker a session reads from
///
/// Vendor integrations plug in through `Custom`; everything downstream only
/// sees the `TrackerLink` interface.
pub enum TrackerBackend {
    Simulated(SimulatedLink),
    Replay(ReplayLink),
    Custom(Box<dyn TrackerLink + Send>),
}

impl TrackerBackend {
    /// Build the backend described by `config`
    /// Simulated gaze starts on `start`
    pub fn from_config(
        config: &BackendConfig,
        clock: MonotonicClock,
        start: Point,
    ) -> Result<Self, TrackerError> {
        match config.kind {
            BackendKind::Simulated => Ok(TrackerBackend::Simulated(SimulatedLink::new(
                clock,
                config.sample_rate_hz,
                config.noise_px,
                start,
            )?)),
            BackendKind::Replay => {
                let path = config.replay_path.as_ref().ok_or_else(|| {
                    TrackerError::StartFailed("replay backend needs replay_path".to_string())
                })?;
                Ok(TrackerBackend::Replay(ReplayLink::open(path, clock)?))
            }
        }
    }

    pub fn custom(link: impl TrackerLink + Send + 'static) -> Self {
        TrackerBackend::Custom(Box::new(link))
    }
}

impl TrackerLink for TrackerBackend {
    fn receive(&mut self) -> Result<RawSample, TrackerError> {
        match self {
            TrackerBackend::Simulated(link) => link.receive(),
            TrackerBackend::Replay(link) => link.receive(),
            TrackerBackend::Custom(link) => link.receive(),
        }
    }

    fn name(&self) -> &str {
        match self {
            TrackerBackend::Simulated(link) => link.name(),
            TrackerBackend::Replay(link) => link.name(),
            TrackerBackend::Custom(link) => link.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ScriptedTracker;

    #[test]
    fn test_simulated_from_default_config() {
        let backend = TrackerBackend::from_config(
            &BackendConfig::default(),
            MonotonicClock::start(),
            Point::new(512.0, 384.0),
        )
        .unwrap();
        assert_eq!(backend.name(), "simulated");
    }

    #[test]
    fn test_replay_without_path_fails() {
        let config = BackendConfig {
            kind: BackendKind::Replay,
            ..BackendConfig::default()
        };
        let result = TrackerBackend::from_config(&config, MonotonicClock::start(), Point::new(0.0, 0.0));
        assert!(matches!(result, Err(TrackerError::StartFailed(_))));
    }

    #[test]
    fn test_custom_link_delegates() {
        let mut backend = TrackerBackend::custom(ScriptedTracker::new(100.0).then_point(3.0, 4.0));
        assert_eq!(backend.name(), "scripted");
        let sample = backend.receive().unwrap();
        assert_eq!(sample.gaze_point().position, Some(Point::new(3.0, 4.0)));
        assert!(backend.receive().is_err());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&BackendKind::Replay).unwrap();
        assert_eq!(json, "\"replay\"");
    }
}
