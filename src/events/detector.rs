// Online gaze event detection
// Classifies the live gaze stream into fixation, saccade and blink events

use crate::calibration::thresholds::ThresholdSet;
use crate::events::types::{EventKind, GazeEvent, GazePoint, Point};
use crate::events::wait::{Detection, Interrupt, WaitLimit};
use crate::tracker::{Clock, SampleProvider, TrackerError};

/// Outcome of one bounded detection call
pub type DetectionResult = Result<Detection<GazeEvent>, TrackerError>;

/// Pulls samples one at a time, checking the wait limit before each pull
struct Poller<'a, P: ?Sized, C: ?Sized> {
    source: &'a mut P,
    clock: &'a C,
    limit: &'a WaitLimit,
}

impl<'a, P, C> Poller<'a, P, C>
where
    P: SampleProvider + ?Sized,
    C: Clock + ?Sized,
{
    fn next(&mut self) -> Result<Result<GazePoint, Interrupt>, TrackerError> {
        if let Some(interrupt) = self.limit.check(self.clock.now_ms()) {
            return Ok(Err(interrupt));
        }
        self.source.sample().map(Ok)
    }

    /// Skip invalid samples until a valid position arrives
    fn next_valid(&mut self) -> Result<Result<Point, Interrupt>, TrackerError> {
        loop {
            match self.next()? {
                Ok(point) => {
                    if let Some(position) = point.position {
                        return Ok(Ok(position));
                    }
                }
                Err(interrupt) => return Ok(Err(interrupt)),
            }
        }
    }

    fn now(&self) -> f64 {
        self.clock.now_ms()
    }
}

/// Stop the surrounding detection call when the poller reports an interrupt
macro_rules! pull {
    ($expr:expr) => {
        match $expr? {
            Ok(value) => value,
            Err(interrupt) => return Ok(interrupt.into()),
        }
    };
}

/// Event detector calibrated with one threshold set
///
/// Holds no sample history between calls: each call starts from the newest
/// sample the provider returns. A new calibration replaces the whole detector.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetector {
    thresholds: ThresholdSet,
}

impl EventDetector {
    pub fn new(thresholds: ThresholdSet) -> Self {
        EventDetector { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    /// Wait for any event kind; end events include their start phase
    pub fn wait_for<P, C>(
        &self,
        kind: EventKind,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        match kind {
            EventKind::FixationStart => self.wait_for_fixation_start(source, clock, limit),
            EventKind::FixationEnd => self.wait_for_fixation_end(source, clock, limit),
            EventKind::SaccadeStart => self.wait_for_saccade_start(source, clock, limit),
            EventKind::SaccadeEnd => self.wait_for_saccade_end(source, clock, limit),
            EventKind::BlinkStart => self.wait_for_blink_start(source, clock, limit),
            EventKind::BlinkEnd => self.wait_for_blink_end(source, clock, limit),
        }
    }

    // ==================== FIXATIONS ====================

    /// Wait until gaze has stayed within the fixation tolerance of an anchor
    /// for the minimum fixation duration
    ///
    /// Any valid sample further than the tolerance from the anchor becomes the
    /// new anchor and restarts the duration. Reports the time the duration was
    /// satisfied and the anchor position.
    pub fn wait_for_fixation_start<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };
        let tolerance_sq = self.thresholds.fixation_tolerance_px.powi(2);

        let mut anchor = pull!(poller.next_valid());
        let mut t0 = poller.now();

        loop {
            let position = pull!(poller.next_valid());
            if position.distance_sq(&anchor) > tolerance_sq {
                anchor = position;
                t0 = poller.now();
            } else {
                let t1 = poller.now();
                if t1 - t0 >= self.thresholds.min_fixation_ms {
                    log::debug!(
                        "Fixation start at {:.1} ms ({:.1}, {:.1})",
                        t1,
                        anchor.x,
                        anchor.y
                    );
                    return Ok(Detection::Found(GazeEvent::fixation_start(t1, anchor)));
                }
            }
        }
    }

    /// Wait for a fixation to start and then to end
    pub fn wait_for_fixation_end<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let start = match self.wait_for_fixation_start(source, clock, limit)? {
            Detection::Found(event) => event,
            Detection::TimedOut => return Ok(Detection::TimedOut),
            Detection::Cancelled => return Ok(Detection::Cancelled),
        };
        let anchor = start.position.unwrap_or(Point::new(0.0, 0.0));
        self.track_fixation_end(anchor, source, clock, limit)
    }

    /// Monitor an ongoing fixation on `anchor` until gaze leaves the tolerance
    ///
    /// Invalid samples never end a fixation. Reports the current time and the
    /// original anchor.
    pub fn track_fixation_end<P, C>(
        &self,
        anchor: Point,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };
        let tolerance_sq = self.thresholds.fixation_tolerance_px.powi(2);

        loop {
            let position = pull!(poller.next_valid());
            if position.distance_sq(&anchor) > tolerance_sq {
                let t = poller.now();
                log::debug!("Fixation end at {:.1} ms", t);
                return Ok(Detection::Found(GazeEvent::fixation_end(t, anchor)));
            }
        }
    }

    // ==================== SACCADES ====================

    /// Noise-normalised squared displacement between two samples
    fn weighted_distance(&self, dx: f64, dy: f64) -> f64 {
        let (tx, ty) = self.thresholds.noise_tolerance_px;
        (dx / tx).powi(2) + (dy / ty).powi(2)
    }

    /// Wait for two consecutive distinct valid samples that move further than
    /// measurement noise and exceed the speed or acceleration threshold
    ///
    /// Reports the earlier sample of the pair as the start position,
    /// timestamped at detection.
    pub fn wait_for_saccade_start<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };

        let mut prev = pull!(poller.next_valid());
        let mut t0 = poller.now();
        let mut v0 = 0.0;

        loop {
            let position = pull!(poller.next_valid());
            let t1 = poller.now();
            if position == prev {
                continue;
            }

            let dx = position.x - prev.x;
            let dy = position.y - prev.y;
            if self.weighted_distance(dx, dy) > self.thresholds.weighted_distance {
                let dt = t1 - t0;
                if dt <= 0.0 {
                    // No time has passed since the last sample; wait for the clock
                    continue;
                }
                let v1 = (dx * dx + dy * dy).sqrt() / dt;
                let a = (v1 - v0) / dt;

                if v1 > self.thresholds.saccade_speed_px_per_ms
                    || a > self.thresholds.saccade_acceleration_px_per_ms2
                {
                    let t = poller.now();
                    log::debug!(
                        "Saccade start at {:.1} ms from ({:.1}, {:.1}), v={:.3} px/ms a={:.4} px/ms^2",
                        t,
                        prev.x,
                        prev.y,
                        v1,
                        a
                    );
                    return Ok(Detection::Found(GazeEvent::saccade_start(t, prev)));
                }

                t0 = t1;
                v0 = v1;
            }
            prev = position;
        }
    }

    /// Wait for a saccade to start and then to end
    pub fn wait_for_saccade_end<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let start = match self.wait_for_saccade_start(source, clock, limit)? {
            Detection::Found(event) => event,
            Detection::TimedOut => return Ok(Detection::TimedOut),
            Detection::Cancelled => return Ok(Detection::Cancelled),
        };
        self.track_saccade_end(&start, source, clock, limit)
    }

    /// Follow a saccade that started with `start` until it decelerates
    ///
    /// Ends on the first distinct valid sample whose speed is below the speed
    /// threshold while acceleration lies strictly between the negative
    /// acceleration threshold and zero.
    pub fn track_saccade_end<P, C>(
        &self,
        start: &GazeEvent,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };
        let start_pos = start.position.unwrap_or(Point::new(0.0, 0.0));
        let speed = self.thresholds.saccade_speed_px_per_ms;
        let acceleration = self.thresholds.saccade_acceleration_px_per_ms2;

        let mut prev = pull!(poller.next_valid());
        let mut t0 = poller.now();
        let mut v0 = {
            let dt = t0 - start.time_ms;
            if dt > 0.0 {
                prev.distance(&start_pos) / dt
            } else {
                0.0
            }
        };

        loop {
            let position = pull!(poller.next_valid());
            let t1 = poller.now();
            if position == prev {
                continue;
            }
            let dt = t1 - t0;
            if dt <= 0.0 {
                continue;
            }

            let v1 = position.distance(&prev) / dt;
            let a = (v1 - v0) / dt;
            if v1 < speed && a > -acceleration && a < 0.0 {
                log::debug!(
                    "Saccade end at {:.1} ms, landed at ({:.1}, {:.1})",
                    t1,
                    position.x,
                    position.y
                );
                return Ok(Detection::Found(GazeEvent::saccade_end(
                    t1, start_pos, position,
                )));
            }

            t0 = t1;
            v0 = v1;
            prev = position;
        }
    }

    // ==================== BLINKS ====================

    /// Wait until data has been missing for the blink confirmation duration
    ///
    /// The reported time is when the invalid run began, so it precedes the
    /// moment of confirmation by up to the confirmation duration.
    pub fn wait_for_blink_start<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };

        loop {
            let point = pull!(poller.next());
            if point.is_valid() {
                continue;
            }

            let t0 = poller.now();
            loop {
                if poller.now() - t0 >= self.thresholds.blink_ms {
                    log::debug!("Blink start at {:.1} ms", t0);
                    return Ok(Detection::Found(GazeEvent::blink_start(t0)));
                }
                let point = pull!(poller.next());
                if point.is_valid() {
                    break;
                }
            }
        }
    }

    /// Wait for a run of missing data followed by a valid sample
    pub fn wait_for_blink_end<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        self.blink_end(false, source, clock, limit)
    }

    /// Wait for the first valid sample after a confirmed blink start
    pub fn track_blink_end<P, C>(
        &self,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        self.blink_end(true, source, clock, limit)
    }

    fn blink_end<P, C>(
        &self,
        mut in_gap: bool,
        source: &mut P,
        clock: &C,
        limit: &WaitLimit,
    ) -> DetectionResult
    where
        P: SampleProvider + ?Sized,
        C: Clock + ?Sized,
    {
        let mut poller = Poller { source, clock, limit };

        loop {
            let point = pull!(poller.next());
            if !point.is_valid() {
                in_gap = true;
            } else if in_gap {
                let t = poller.now();
                log::debug!("Blink end at {:.1} ms", t);
                return Ok(Detection::Found(GazeEvent::blink_end(t)));
            }
        }
    }
}
