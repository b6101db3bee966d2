// Drift correction
// Single-point recheck of calibration validity with recalibration as fallback

use serde::{Deserialize, Serialize};

use crate::events::types::Point;
use crate::events::wait::{Interrupt, WaitLimit};
use crate::geometry::ScreenGeometry;
use crate::tracker::{Clock, InputPoller, InputSignal, SampleProvider, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftSettings {
    /// Accepted distance between gaze and target in manual mode (degrees)
    pub error_distance_deg: f64,

    /// Failed confirmations before giving up in manual mode
    pub max_attempts: u32,

    /// Time after which the check falls back to recalibration (ms)
    pub timeout_ms: f64,

    /// Samples a stable run needs in fixation-triggered mode
    pub min_samples: usize,

    /// Maximal distance between the mean of a stable run and the target (px)
    pub max_deviation_px: f64,

    /// Per-axis sample-to-sample jump that restarts a stable run (px)
    ///
    /// The sample that breaks a run becomes the first sample of the next one.
    pub reset_threshold_px: f64,

    /// How long one input poll may wait in manual mode (ms)
    pub poll_interval_ms: f64,
}

impl Default for DriftSettings {
    fn default() -> Self {
        DriftSettings {
            error_distance_deg: 2.0,
            max_attempts: 3,
            timeout_ms: 10_000.0,
            min_samples: 30,
            max_deviation_px: 60.0,
            reset_threshold_px: 10.0,
            poll_interval_ms: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMode {
    /// Wait for a confirmation signal, then compare gaze to the target
    Manual,
    /// Accept as soon as gaze rests stably near the target
    FixationTriggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalibrationReason {
    TooManyFailures,
    Cancelled,
    Timeout,
}

/// Result of a drift check; never an error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftOutcome {
    Accepted {
        /// Distance between measured gaze and the target (px)
        error_px: f64,
        /// Confirmations (manual) or stable runs (fixation-triggered) used
        attempts: u32,
    },
    Recalibrate(RecalibrationReason),
}

impl DriftOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DriftOutcome::Accepted { .. })
    }
}

fn interrupted(interrupt: Interrupt) -> DriftOutcome {
    match interrupt {
        Interrupt::Cancelled => DriftOutcome::Recalibrate(RecalibrationReason::Cancelled),
        Interrupt::TimedOut => DriftOutcome::Recalibrate(RecalibrationReason::Timeout),
    }
}

/// Drift checker for one screen setup
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    settings: DriftSettings,
    error_distance_px: f64,
}

impl DriftCorrector {
    pub fn new(settings: DriftSettings, geometry: &ScreenGeometry) -> Self {
        DriftCorrector {
            error_distance_px: geometry.deg_to_pix(settings.error_distance_deg),
            settings,
        }
    }

    pub fn settings(&self) -> &DriftSettings {
        &self.settings
    }

    /// Accepted gaze-to-target distance in manual mode (px)
    pub fn error_distance_px(&self) -> f64 {
        self.error_distance_px
    }

    /// Run a drift check in the given mode
    ///
    /// Only a tracker disconnect is returned as an error; timeouts,
    /// cancellation and repeated failures all ask for recalibration.
    pub fn check<P, C, I>(
        &self,
        mode: DriftMode,
        source: &mut P,
        clock: &C,
        input: &mut I,
        target: Point,
        limit: &WaitLimit,
    ) -> Result<DriftOutcome, TrackerError>
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
        I: InputPoller + ?Sized,
    {
        let limit = limit.capped(clock.now_ms() + self.settings.timeout_ms);
        let outcome = match mode {
            DriftMode::Manual => self.manual(source, clock, input, target, &limit)?,
            DriftMode::FixationTriggered => {
                self.fixation_triggered(source, clock, input, target, &limit)?
            }
        };

        match outcome {
            DriftOutcome::Accepted { error_px, attempts } => log::info!(
                "Drift check accepted: error {:.1} px after {} attempt(s)",
                error_px,
                attempts
            ),
            DriftOutcome::Recalibrate(reason) => {
                log::warn!("Drift check failed ({:?}), recalibration needed", reason)
            }
        }
        Ok(outcome)
    }

    fn manual<P, C, I>(
        &self,
        source: &mut P,
        clock: &C,
        input: &mut I,
        target: Point,
        limit: &WaitLimit,
    ) -> Result<DriftOutcome, TrackerError>
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
        I: InputPoller + ?Sized,
    {
        let mut failures = 0u32;

        loop {
            if let Some(interrupt) = limit.check(clock.now_ms()) {
                return Ok(interrupted(interrupt));
            }

            match input.next_signal(Some(self.settings.poll_interval_ms)) {
                Some(InputSignal::Cancel) => {
                    return Ok(DriftOutcome::Recalibrate(RecalibrationReason::Cancelled))
                }
                Some(InputSignal::Confirm) => {
                    let gaze = source.sample()?;
                    let error = gaze.position.map(|p| p.distance(&target));
                    match error {
                        Some(error_px) if error_px <= self.error_distance_px => {
                            return Ok(DriftOutcome::Accepted {
                                error_px,
                                attempts: failures + 1,
                            });
                        }
                        _ => {
                            failures += 1;
                            log::warn!(
                                "Drift confirmation {} rejected: error {:?} px (limit {:.1} px)",
                                failures,
                                error,
                                self.error_distance_px
                            );
                            if failures >= self.settings.max_attempts {
                                return Ok(DriftOutcome::Recalibrate(
                                    RecalibrationReason::TooManyFailures,
                                ));
                            }
                        }
                    }
                }
                None => {
                    // Keep the link drained so disconnects surface while waiting
                    source.sample()?;
                }
            }
        }
    }

    fn fixation_triggered<P, C, I>(
        &self,
        source: &mut P,
        clock: &C,
        input: &mut I,
        target: Point,
        limit: &WaitLimit,
    ) -> Result<DriftOutcome, TrackerError>
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
        I: InputPoller + ?Sized,
    {
        let min_samples = self.settings.min_samples.max(1);
        let reset = self.settings.reset_threshold_px;
        let mut run: Vec<Point> = Vec::with_capacity(min_samples);
        let mut runs = 0u32;
        let mut last_time: Option<f64> = None;

        loop {
            if let Some(interrupt) = limit.check(clock.now_ms()) {
                return Ok(interrupted(interrupt));
            }
            if input.next_signal(Some(0.0)) == Some(InputSignal::Cancel) {
                return Ok(DriftOutcome::Recalibrate(RecalibrationReason::Cancelled));
            }

            let gaze = source.sample()?;
            if last_time == Some(gaze.time_ms) {
                continue;
            }
            last_time = Some(gaze.time_ms);
            let Some(position) = gaze.position else {
                continue;
            };

            let continues_run = run.last().is_some_and(|prev| {
                (position.x - prev.x).abs() < reset && (position.y - prev.y).abs() < reset
            });
            if !continues_run {
                run.clear();
            }
            run.push(position);

            if run.len() < min_samples {
                continue;
            }

            runs += 1;
            let n = run.len() as f64;
            let mean = Point::new(
                run.iter().map(|p| p.x).sum::<f64>() / n,
                run.iter().map(|p| p.y).sum::<f64>() / n,
            );
            let error_px = mean.distance(&target);
            if error_px < self.settings.max_deviation_px {
                return Ok(DriftOutcome::Accepted {
                    error_px,
                    attempts: runs,
                });
            }

            log::debug!(
                "Stable gaze ({:.1}, {:.1}) too far from target ({:.1}, {:.1})",
                mean.x,
                mean.y,
                target.x,
                target.y
            );
            run.clear();
        }
    }
}
