// Experiment clock
use std::time::Instant;

use super::Clock;

/// Wall-clock milliseconds since the experiment started
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Start a clock whose epoch is now
    pub fn start() -> Self {
        MonotonicClock {
            epoch: Instant::now(),
        }
    }

    pub fn with_epoch(epoch: Instant) -> Self {
        MonotonicClock { epoch }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}
