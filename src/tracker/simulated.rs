// Simulated tracker
// Fixed-rate gaze with Gaussian noise around a target that can be moved at runtime

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{Clock, MonotonicClock, TrackerError, TrackerLink};
use crate::events::types::{Point, RawSample};

#[derive(Debug, Clone)]
struct GazeState {
    target: Point,
    eyes_closed: bool,
    disconnected: bool,
}

/// Handle for steering a running SimulatedLink from another thread
#[derive(Debug, Clone)]
pub struct SimulatedGaze {
    state: Arc<Mutex<GazeState>>,
}

impl SimulatedGaze {
    fn new(target: Point) -> Self {
        SimulatedGaze {
            state: Arc::new(Mutex::new(GazeState {
                target,
                eyes_closed: false,
                disconnected: false,
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut GazeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Move gaze to a new position; the next sample jumps there
    pub fn look_at(&self, x: f64, y: f64) {
        self.with_state(|s| s.target = Point::new(x, y));
    }

    pub fn target(&self) -> Point {
        self.with_state(|s| s.target)
    }

    /// Stop delivering gaze data until `open_eyes`
    pub fn close_eyes(&self) {
        self.with_state(|s| s.eyes_closed = true);
    }

    pub fn open_eyes(&self) {
        self.with_state(|s| s.eyes_closed = false);
    }

    /// Make every further `receive` fail
    pub fn disconnect(&self) {
        self.with_state(|s| s.disconnected = true);
    }
}

/// Tracker stand-in producing samples at a fixed rate
pub struct SimulatedLink {
    clock: MonotonicClock,
    interval_ms: f64,
    noise: Normal<f64>,
    pupil_noise: Normal<f64>,
    pupil_size: f64,
    next_due_ms: Option<f64>,
    rng: StdRng,
    gaze: SimulatedGaze,
}

impl SimulatedLink {
    /// Simulated tracker starting with gaze on `start`
    ///
    /// Fails when the sample rate is not positive or the noise level is
    /// negative or not finite.
    pub fn new(
        clock: MonotonicClock,
        sample_rate_hz: f64,
        noise_px: f64,
        start: Point,
    ) -> Result<Self, TrackerError> {
        if !(sample_rate_hz > 0.0) || !sample_rate_hz.is_finite() {
            return Err(TrackerError::StartFailed(format!(
                "invalid sample rate {}",
                sample_rate_hz
            )));
        }
        let noise = Normal::new(0.0, noise_px).map_err(|e| {
            TrackerError::StartFailed(format!("invalid noise level {}: {}", noise_px, e))
        })?;
        let pupil_noise = Normal::new(0.0, 0.05)
            .map_err(|e| TrackerError::StartFailed(format!("invalid pupil noise: {}", e)))?;

        Ok(SimulatedLink {
            clock,
            interval_ms: 1000.0 / sample_rate_hz,
            noise,
            pupil_noise,
            pupil_size: 4.0,
            next_due_ms: None,
            rng: StdRng::from_entropy(),
            gaze: SimulatedGaze::new(start),
        })
    }

    /// Use a fixed RNG seed for reproducible noise
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Handle that controls where this tracker "looks"
    pub fn gaze(&self) -> SimulatedGaze {
        self.gaze.clone()
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    fn wait_for_next_tick(&mut self) -> f64 {
        let now = self.clock.now_ms();
        let due = self.next_due_ms.unwrap_or(now);
        if due > now {
            thread::sleep(Duration::from_secs_f64((due - now) / 1000.0));
        }
        // Drop ticks that were missed instead of bursting to catch up
        let time_ms = self.clock.now_ms().max(due);
        self.next_due_ms = Some(time_ms + self.interval_ms);
        time_ms
    }
}

impl TrackerLink for SimulatedLink {
    fn receive(&mut self) -> Result<RawSample, TrackerError> {
        let time_ms = self.wait_for_next_tick();
        let state = self.gaze.with_state(|s| s.clone());

        if state.disconnected {
            return Err(TrackerError::Disconnected(
                "simulated tracker disconnected".to_string(),
            ));
        }
        if state.eyes_closed {
            return Ok(RawSample::missing(time_ms));
        }

        let gaze = Point::new(
            state.target.x + self.noise.sample(&mut self.rng),
            state.target.y + self.noise.sample(&mut self.rng),
        );
        let pupil = self.pupil_size + self.pupil_noise.sample(&mut self.rng);
        Ok(RawSample::binocular(time_ms, gaze, pupil))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
