// Deadlines and cancellation for detection loops
// Every polling loop checks its WaitLimit once per iteration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::tracker::Clock;

/// Shared flag used to abandon a wait from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Upper bound on how long a detection call may poll
///
/// `WaitLimit::unbounded()` keeps polling until the event occurs, so callers
/// using it must be certain the stream will produce one.
#[derive(Debug, Clone, Default)]
pub struct WaitLimit {
    /// Absolute deadline on the clock passed to the detection call
    pub deadline_ms: Option<f64>,
    pub cancel: Option<CancelToken>,
}

/// Why a wait stopped without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    TimedOut,
    Cancelled,
}

impl WaitLimit {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Deadline `timeout_ms` after the clock's current time
    pub fn within<C: Clock + ?Sized>(clock: &C, timeout_ms: f64) -> Self {
        WaitLimit {
            deadline_ms: Some(clock.now_ms() + timeout_ms),
            cancel: None,
        }
    }

    pub fn until(deadline_ms: f64) -> Self {
        WaitLimit {
            deadline_ms: Some(deadline_ms),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Same limit with the deadline moved earlier to `deadline_ms` if needed
    pub fn capped(&self, deadline_ms: f64) -> Self {
        WaitLimit {
            deadline_ms: Some(self.deadline_ms.map_or(deadline_ms, |d| d.min(deadline_ms))),
            cancel: self.cancel.clone(),
        }
    }

    /// Check the limit against the current time
    /// Cancellation wins over the deadline
    pub fn check(&self, now_ms: f64) -> Option<Interrupt> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => Some(Interrupt::TimedOut),
            _ => None,
        }
    }
}

/// Result of a bounded detection call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection<T> {
    Found(T),
    TimedOut,
    Cancelled,
}

impl<T> Detection<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Detection::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Detection::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Detection<U> {
        match self {
            Detection::Found(value) => Detection::Found(f(value)),
            Detection::TimedOut => Detection::TimedOut,
            Detection::Cancelled => Detection::Cancelled,
        }
    }
}

impl<T> From<Interrupt> for Detection<T> {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::TimedOut => Detection::TimedOut,
            Interrupt::Cancelled => Detection::Cancelled,
        }
    }
}
