//! Binary latch

use std::time::{Duration, Instant};

use super::condvar::{HazardCondVar, WaitResult};
use super::mutex::UnfairMutex;
use crate::error::Result;

/// A gate that is either open or closed; waiters block while it is closed.
pub struct EventGate {
    closed: UnfairMutex<bool>,
    cond: HazardCondVar,
}

impl EventGate {
    /// Create a gate in the given state.
    #[must_use]
    pub fn new(closed: bool) -> Self {
        Self {
            closed: UnfairMutex::new(closed),
            cond: HazardCondVar::new(),
        }
    }

    /// `true` closes the gate, `false` opens it and releases all waiters.
    pub fn set(&self, closed: bool) {
        let mut state = self.closed.lock();
        *state = closed;
        if !closed {
            self.cond.signal();
        }
    }

    /// True while the gate is closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Block while the gate is closed.
    ///
    /// # Errors
    /// Returns [`crate::Error::CancellationRequested`] if the calling thread is terminated.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.closed.lock();
        while *state {
            self.cond.wait(&mut state)?;
        }
        Ok(())
    }

    /// Block while closed, for at most `timeout`. Returns true if the gate is open.
    ///
    /// # Errors
    /// Returns [`crate::Error::CancellationRequested`] if the calling thread is terminated.
    pub fn wait_timed(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.closed.lock();
        while *state {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            if self.cond.wait_timed(&mut state, remaining)? == WaitResult::TimedOut {
                return Ok(!*state);
            }
        }
        Ok(true)
    }
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_open_gate_does_not_block() {
        let gate = EventGate::new(false);
        gate.wait().unwrap();
        assert!(gate.wait_timed(Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_closed_gate_times_out() {
        let gate = EventGate::new(true);
        assert!(!gate.wait_timed(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_opening_releases_waiter() {
        let gate = Arc::new(EventGate::new(true));
        let waiter = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.wait_timed(Duration::from_secs(5)).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        gate.set(false);
        assert!(waiter.join().unwrap());
    }
}
