//! Injectable delays for the reconciler's retry loop

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Source of delays
///
/// `sleep` returns `false` when the wait was cut short by cancellation.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> bool;
}

/// Real delay that can be cancelled from another thread
#[derive(Default)]
pub struct ThreadSleeper {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl ThreadSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut short the current and every later sleep until [`reset`](Self::reset)
    pub fn cancel(&self) {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.wake.notify_all();
    }

    pub fn reset(&self) {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> bool {
        let guard = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        !*guard
    }
}

/// Records requested delays without waiting
#[derive(Default)]
pub struct InstantSleeper {
    requests: Mutex<Vec<Duration>>,
    cancel_after: Option<usize>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation for every sleep after the first `sleeps`
    pub fn cancelling_after(sleeps: usize) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            cancel_after: Some(sleeps),
        }
    }

    /// Every delay requested so far
    pub fn requests(&self) -> Vec<Duration> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn total(&self) -> Duration {
        self.requests().iter().sum()
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests.push(duration);
        self.cancel_after.is_none_or(|limit| requests.len() <= limit)
    }
}
