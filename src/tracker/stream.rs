// Producer/consumer gaze stream
// Receive thread that feeds the latest-sample slot and the sample log queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{Clock, LatestSample, MonotonicClock, SampleProvider, TrackerError, TrackerLink};
use crate::events::types::GazePoint;
use crate::pipeline::LogQueue;

/// Background reader of a tracker link
///
/// The detector only ever reads the slot, so detection never waits on the
/// link or on log I/O.
pub struct GazeStream {
    slot: LatestSample,
    clock: MonotonicClock,
    recording: Arc<AtomicBool>,
    stop_signal: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    link_name: String,
}

impl GazeStream {
    /// Start receiving from `link` on a dedicated thread
    /// Samples are queued to `log` only while recording is on
    pub fn spawn<L>(mut link: L, clock: MonotonicClock, log: Option<LogQueue>) -> Self
    where
        L: TrackerLink + Send + 'static,
    {
        let slot = LatestSample::new();
        let recording = Arc::new(AtomicBool::new(false));
        let stop_signal = Arc::new(AtomicBool::new(false));
        let link_name = link.name().to_string();

        let thread_slot = slot.clone();
        let thread_recording = Arc::clone(&recording);
        let thread_stop = Arc::clone(&stop_signal);

        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::SeqCst) {
                match link.receive() {
                    Ok(raw) => {
                        thread_slot.publish(raw.gaze_point());
                        if thread_recording.load(Ordering::Relaxed) {
                            if let Some(queue) = &log {
                                queue.sample(raw);
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("Tracker link {} failed: {}", link.name(), e);
                        thread_slot.fail(e);
                        break;
                    }
                }
            }
            log::debug!("Gaze stream for {} stopped", link.name());
        });

        log::info!("Started gaze stream for {}", link_name);

        GazeStream {
            slot,
            clock,
            recording,
            stop_signal,
            handle: Some(handle),
            link_name,
        }
    }

    /// Sample provider reading the latest-sample slot
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            slot: self.slot.clone(),
            clock: self.clock,
        }
    }

    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// True once the link reported a failure
    pub fn is_failed(&self) -> bool {
        self.slot.is_failed()
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Signal the receive thread and wait for it to finish
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Gaze stream thread for {} panicked", self.link_name);
            }
        }
    }
}

impl Drop for GazeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lossy latest-value reader handed to detection and calibration
#[derive(Debug, Clone)]
pub struct StreamReader {
    slot: LatestSample,
    clock: MonotonicClock,
}

impl SampleProvider for StreamReader {
    fn sample(&mut self) -> Result<GazePoint, TrackerError> {
        thread::yield_now();
        self.slot.read(self.clock.now_ms())
    }
}
