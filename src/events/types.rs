// Gaze event types
// Defines gaze samples, raw per-eye tracker data, and detected event records

use serde::{Deserialize, Serialize};

/// A position on screen in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Squared Euclidean distance to another point
    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_sq(other).sqrt()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

/// Newest gaze position at an instant, or the invalid marker
///
/// An invalid point has no position and can never take part in distance or
/// velocity arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    /// Milliseconds since experiment start
    pub time_ms: f64,

    /// Gaze position in pixels, `None` when the tracker has no data
    pub position: Option<Point>,
}

impl GazePoint {
    pub fn valid(time_ms: f64, x: f64, y: f64) -> Self {
        GazePoint {
            time_ms,
            position: Some(Point { x, y }),
        }
    }

    pub fn invalid(time_ms: f64) -> Self {
        GazePoint {
            time_ms,
            position: None,
        }
    }

    /// Build a point from raw tracker coordinates
    /// Trackers signal missing data with (0, 0), (-1, -1) or non-finite values
    pub fn from_raw(time_ms: f64, x: f64, y: f64) -> Self {
        if is_missing(x, y) {
            GazePoint::invalid(time_ms)
        } else {
            GazePoint::valid(time_ms, x, y)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.position.is_some()
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }
}

fn is_missing(x: f64, y: f64) -> bool {
    !x.is_finite() || !y.is_finite() || (x == 0.0 && y == 0.0) || (x == -1.0 && y == -1.0)
}

/// Gaze position and pupil size for one eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    pub gaze: Point,
    pub pupil_size: f64,
}

/// One sample as delivered by a tracker, with per-eye data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Milliseconds since experiment start
    pub time_ms: f64,
    pub left: Option<EyeSample>,
    pub right: Option<EyeSample>,
}

impl RawSample {
    /// Sample where both eyes report the same position
    pub fn binocular(time_ms: f64, gaze: Point, pupil_size: f64) -> Self {
        let eye = EyeSample { gaze, pupil_size };
        RawSample {
            time_ms,
            left: Some(eye),
            right: Some(eye),
        }
    }

    /// Sample with no data for either eye
    pub fn missing(time_ms: f64) -> Self {
        RawSample {
            time_ms,
            left: None,
            right: None,
        }
    }

    /// Derive the gaze point used for detection
    /// Averages both eyes when both are valid, otherwise uses whichever is valid
    pub fn gaze_point(&self) -> GazePoint {
        let usable = |eye: Option<EyeSample>| {
            eye.map(|e| e.gaze)
                .filter(|p| !is_missing(p.x, p.y))
        };

        match (usable(self.left), usable(self.right)) {
            (Some(l), Some(r)) => {
                GazePoint::valid(self.time_ms, (l.x + r.x) / 2.0, (l.y + r.y) / 2.0)
            }
            (Some(p), None) | (None, Some(p)) => GazePoint::valid(self.time_ms, p.x, p.y),
            (None, None) => GazePoint::invalid(self.time_ms),
        }
    }
}

/// Kind of a detected gaze event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FixationStart,
    FixationEnd,
    SaccadeStart,
    SaccadeEnd,
    BlinkStart,
    BlinkEnd,
}

impl EventKind {
    /// Label used in the sample log message column
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FixationStart => "FIXATION_START",
            EventKind::FixationEnd => "FIXATION_END",
            EventKind::SaccadeStart => "SACCADE_START",
            EventKind::SaccadeEnd => "SACCADE_END",
            EventKind::BlinkStart => "BLINK_START",
            EventKind::BlinkEnd => "BLINK_END",
        }
    }
}

/// A detected gaze event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeEvent {
    pub kind: EventKind,

    /// Milliseconds since experiment start
    pub time_ms: f64,

    /// Fixation anchor or saccade start position
    /// Blinks carry no position
    pub position: Option<Point>,

    /// Saccade landing position, only set for `SaccadeEnd`
    pub end_position: Option<Point>,
}

impl GazeEvent {
    pub fn fixation_start(time_ms: f64, anchor: Point) -> Self {
        GazeEvent {
            kind: EventKind::FixationStart,
            time_ms,
            position: Some(anchor),
            end_position: None,
        }
    }

    pub fn fixation_end(time_ms: f64, anchor: Point) -> Self {
        GazeEvent {
            kind: EventKind::FixationEnd,
            time_ms,
            position: Some(anchor),
            end_position: None,
        }
    }

    pub fn saccade_start(time_ms: f64, start: Point) -> Self {
        GazeEvent {
            kind: EventKind::SaccadeStart,
            time_ms,
            position: Some(start),
            end_position: None,
        }
    }

    pub fn saccade_end(time_ms: f64, start: Point, end: Point) -> Self {
        GazeEvent {
            kind: EventKind::SaccadeEnd,
            time_ms,
            position: Some(start),
            end_position: Some(end),
        }
    }

    pub fn blink_start(time_ms: f64) -> Self {
        GazeEvent {
            kind: EventKind::BlinkStart,
            time_ms,
            position: None,
            end_position: None,
        }
    }

    pub fn blink_end(time_ms: f64) -> Self {
        GazeEvent {
            kind: EventKind::BlinkEnd,
            time_ms,
            position: None,
            end_position: None,
        }
    }

    /// One-line description for the sample log message column
    pub fn to_log_line(&self) -> String {
        let mut line = format!("{} {:.3}", self.kind.as_str(), self.time_ms);
        if let Some(p) = self.position {
            line.push_str(&format!(" {:.1} {:.1}", p.x, p.y));
        }
        if let Some(p) = self.end_position {
            line.push_str(&format!(" {:.1} {:.1}", p.x, p.y));
        }
        line
    }
}
