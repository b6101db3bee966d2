// Experiment data logging
// Sample log and structured trace behind one fire-and-forget Logger interface

pub mod sample_log;
pub mod trace;

pub use sample_log::{read_sample_log, LogQueue, LogRecord, SampleLog, SampleLogError};
pub use trace::{read_trace_file, TraceBuilder, TraceEntry, TraceError, TraceKind, TraceWriter};

use crate::events::types::GazeEvent;

/// Receives free-text messages and detected events
///
/// Delivery is fire-and-forget: implementations report their own failures
/// through `log` and never fail the caller.
pub trait Logger {
    fn message(&self, time_ms: f64, text: &str);

    fn event(&self, event: &GazeEvent);
}

impl<L: Logger + ?Sized> Logger for &L {
    fn message(&self, time_ms: f64, text: &str) {
        (**self).message(time_ms, text)
    }

    fn event(&self, event: &GazeEvent) {
        (**self).event(event)
    }
}
