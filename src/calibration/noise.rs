// Noise calibration
// Measures accuracy and sample-to-sample RMS noise while gaze rests on a target

use serde::{Deserialize, Serialize};

use super::CalibrationError;
use crate::events::types::Point;
use crate::events::wait::{Interrupt, WaitLimit};
use crate::tracker::{Clock, SampleProvider};

/// How samples are collected during noise calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Time given to the participant to settle on the target before sampling (ms)
    pub settle_ms: f64,

    /// Minimum number of valid samples to collect
    pub min_samples: usize,

    /// Minimum collection time (ms)
    pub min_duration_ms: f64,

    /// Collection stops here even if fewer than `min_samples` arrived (ms)
    pub max_duration_ms: f64,

    /// Fail the calibration when the worse axis is less accurate than this (degrees)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_accuracy_deg: Option<f64>,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        NoiseSettings {
            settle_ms: 500.0,
            min_samples: 10,
            min_duration_ms: 1000.0,
            max_duration_ms: 5000.0,
            max_accuracy_deg: None,
        }
    }
}

/// Raw statistics of one noise measurement, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseMeasurement {
    pub samples_used: usize,
    pub accuracy_px: (f64, f64),
    pub rms_noise_px: (f64, f64),
}

/// Collect samples on `target` and compute accuracy and RMS noise
///
/// Samples repeated with the same timestamp (a lossy latest-value read) are
/// only counted once. The first collected sample is discarded as a transient.
pub fn measure_noise<P, C>(
    source: &mut P,
    clock: &C,
    target: Point,
    settings: &NoiseSettings,
    limit: &WaitLimit,
) -> Result<NoiseMeasurement, CalibrationError>
where
    P: SampleProvider + ?Sized,
    C: Clock + ?Sized,
{
    let settle_start = clock.now_ms();
    while clock.now_ms() - settle_start < settings.settle_ms {
        match limit.check(clock.now_ms()) {
            Some(Interrupt::Cancelled) => return Err(CalibrationError::Aborted),
            Some(Interrupt::TimedOut) => break,
            None => {}
        }
        source.sample()?;
    }

    let mut collected: Vec<Point> = Vec::with_capacity(settings.min_samples * 4);
    let mut last_time: Option<f64> = None;
    let t0 = clock.now_ms();

    loop {
        let now = clock.now_ms();
        match limit.check(now) {
            Some(Interrupt::Cancelled) => return Err(CalibrationError::Aborted),
            Some(Interrupt::TimedOut) => break,
            None => {}
        }

        let elapsed = now - t0;
        if elapsed >= settings.max_duration_ms {
            break;
        }
        if elapsed >= settings.min_duration_ms && collected.len() >= settings.min_samples {
            break;
        }

        let point = source.sample()?;
        if last_time == Some(point.time_ms) {
            continue;
        }
        last_time = Some(point.time_ms);
        if let Some(position) = point.position {
            collected.push(position);
        }
    }

    let usable = collected.get(1..).unwrap_or(&[]);
    if usable.len() < 2 {
        log::warn!(
            "Noise calibration collected only {} usable samples",
            usable.len()
        );
        return Err(CalibrationError::InsufficientData {
            collected: usable.len(),
        });
    }

    let n = usable.len() as f64;
    let accuracy_x = usable.iter().map(|p| (p.x - target.x).abs()).sum::<f64>() / n;
    let accuracy_y = usable.iter().map(|p| (p.y - target.y).abs()).sum::<f64>() / n;

    let pairs = (usable.len() - 1) as f64;
    let (sum_x, sum_y) = usable.windows(2).fold((0.0, 0.0), |(sx, sy), w| {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        (sx + dx * dx, sy + dy * dy)
    });

    let measurement = NoiseMeasurement {
        samples_used: usable.len(),
        accuracy_px: (accuracy_x, accuracy_y),
        rms_noise_px: ((sum_x / pairs).sqrt(), (sum_y / pairs).sqrt()),
    };

    log::info!(
        "Noise calibration: {} samples, accuracy ({:.2}, {:.2}) px, RMS ({:.2}, {:.2}) px",
        measurement.samples_used,
        measurement.accuracy_px.0,
        measurement.accuracy_px.1,
        measurement.rms_noise_px.0,
        measurement.rms_noise_px.1
    );

    Ok(measurement)
}
