// Input polling
// Confirmation and cancellation signals for drift correction

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    /// Participant is looking at the target (space bar in most setups)
    Confirm,
    /// Skip the check and recalibrate
    Cancel,
}

/// Source of confirmation/cancellation signals
pub trait InputPoller {
    /// Next signal within `timeout_ms`, or `None` if nothing arrived
    /// `None` as the timeout blocks until a signal arrives
    fn next_signal(&mut self, timeout_ms: Option<f64>) -> Option<InputSignal>;
}

impl<I: InputPoller + ?Sized> InputPoller for &mut I {
    fn next_signal(&mut self, timeout_ms: Option<f64>) -> Option<InputSignal> {
        (**self).next_signal(timeout_ms)
    }
}

/// Signals delivered from another thread (keyboard handler, UI, network)
pub struct ChannelInput {
    receiver: Receiver<InputSignal>,
}

impl ChannelInput {
    /// Create the poller and the sender that feeds it
    pub fn channel() -> (Sender<InputSignal>, ChannelInput) {
        let (sender, receiver) = mpsc::channel();
        (sender, ChannelInput { receiver })
    }
}

impl InputPoller for ChannelInput {
    fn next_signal(&mut self, timeout_ms: Option<f64>) -> Option<InputSignal> {
        match timeout_ms {
            Some(ms) => {
                let timeout = Duration::from_secs_f64(ms.max(0.0) / 1000.0);
                match self.receiver.recv_timeout(timeout) {
                    Ok(signal) => Some(signal),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        log::debug!("Input channel closed");
                        None
                    }
                }
            }
            None => self.receiver.recv().ok(),
        }
    }
}

/// Fixed sequence of poll results, one per call
///
/// `None` entries model polls where nothing was pressed; once the script is
/// used up every poll returns `None`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    polls: VecDeque<Option<InputSignal>>,
}

impl ScriptedInput {
    pub fn new(polls: impl IntoIterator<Item = Option<InputSignal>>) -> Self {
        ScriptedInput {
            polls: polls.into_iter().collect(),
        }
    }

    /// Poller that never reports anything
    pub fn silent() -> Self {
        Self::default()
    }
}

impl InputPoller for ScriptedInput {
    fn next_signal(&mut self, _timeout_ms: Option<f64>) -> Option<InputSignal> {
        self.polls.pop_front().flatten()
    }
}
