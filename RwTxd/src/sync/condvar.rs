//! Condition variable that wakes on thread termination

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::thread::{Hazard, current_thread_state};
use crate::error::{Error, Result};

/// How a timed wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by `signal` or `signal_count`.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

#[derive(Default)]
struct CondState {
    waiting: usize,
    tokens: usize,
}

#[derive(Default)]
struct CondShared {
    state: Mutex<CondState>,
    cv: Condvar,
}

impl Hazard for CondShared {
    fn trigger(&self) {
        let _state = self.state.lock();
        self.cv.notify_all();
    }
}

/// Condition variable whose waits are registered as termination hazards.
///
/// A thread blocked in [`wait`](Self::wait) wakes when its owner requests
/// termination and returns [`Error::CancellationRequested`] instead of
/// sleeping through a shutdown.
#[derive(Clone, Default)]
pub struct HazardCondVar {
    shared: Arc<CondShared>,
}

impl HazardCondVar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release `guard`, sleep until signaled, and reacquire.
    ///
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the calling thread is terminated.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) -> Result<()> {
        self.wait_until(guard, None).map(|_| ())
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the calling thread is terminated.
    pub fn wait_timed<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> Result<WaitResult> {
        self.wait_until(guard, Some(Instant::now() + timeout))
    }

    fn wait_until<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Option<Instant>,
    ) -> Result<WaitResult> {
        let thread = current_thread_state();
        let _registration = thread.register_hazard(Arc::clone(&self.shared) as Arc<dyn Hazard>);

        // Taken before the outer lock is released so a signal cannot slip in between.
        let mut state = self.shared.state.lock();
        if thread.is_terminating() {
            return Err(Error::CancellationRequested);
        }
        state.waiting += 1;

        let shared = &self.shared;
        MutexGuard::unlocked(guard, move || {
            loop {
                if state.tokens > 0 {
                    state.tokens -= 1;
                    state.waiting -= 1;
                    return Ok(WaitResult::Signaled);
                }
                if thread.is_terminating() {
                    state.waiting -= 1;
                    return Err(Error::CancellationRequested);
                }
                match deadline {
                    Some(deadline) => {
                        if shared.cv.wait_until(&mut state, deadline).timed_out() {
                            state.waiting -= 1;
                            if state.tokens > 0 {
                                state.tokens -= 1;
                                return Ok(WaitResult::Signaled);
                            }
                            return Ok(WaitResult::TimedOut);
                        }
                    }
                    None => shared.cv.wait(&mut state),
                }
            }
        })
    }

    /// Wake every current waiter.
    pub fn signal(&self) {
        let mut state = self.shared.state.lock();
        state.tokens = state.waiting;
        self.shared.cv.notify_all();
    }

    /// Wake up to `count` current waiters.
    pub fn signal_count(&self, count: usize) {
        let mut state = self.shared.state.lock();
        state.tokens = (state.tokens + count).min(state.waiting);
        self.shared.cv.notify_all();
    }

    /// Number of threads currently parked on this variable.
    pub fn waiting_count(&self) -> usize {
        self.shared.state.lock().waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ManagedThread, UnfairMutex};

    fn wait_for_waiters(cond: &HazardCondVar, n: usize) {
        while cond.waiting_count() < n {
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_timed_wait_times_out() {
        let mutex = UnfairMutex::new(());
        let cond = HazardCondVar::new();
        let mut guard = mutex.lock();
        let result = cond.wait_timed(&mut guard, Duration::from_millis(10)).unwrap();
        assert_eq!(result, WaitResult::TimedOut);
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let mutex = Arc::new(UnfairMutex::new(false));
        let cond = HazardCondVar::new();

        let waiter = {
            let mutex = Arc::clone(&mutex);
            let cond = cond.clone();
            std::thread::spawn(move || {
                let mut guard = mutex.lock();
                while !*guard {
                    cond.wait(&mut guard).unwrap();
                }
            })
        };

        wait_for_waiters(&cond, 1);
        *mutex.lock() = true;
        cond.signal();
        waiter.join().unwrap();
    }

    #[test]
    fn test_signal_count_wakes_limited_waiters() {
        let mutex = Arc::new(UnfairMutex::new(()));
        let cond = HazardCondVar::new();
        let (tx, rx) = std::sync::mpsc::channel();

        for _ in 0..3 {
            let mutex = Arc::clone(&mutex);
            let cond = cond.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let mut guard = mutex.lock();
                let result = cond.wait_timed(&mut guard, Duration::from_secs(5)).unwrap();
                tx.send(result).unwrap();
            });
        }

        wait_for_waiters(&cond, 3);
        cond.signal_count(2);
        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!((first, second), (WaitResult::Signaled, WaitResult::Signaled));
        assert_eq!(cond.waiting_count(), 1);
        cond.signal();
        assert_eq!(rx.recv().unwrap(), WaitResult::Signaled);
    }

    #[test]
    fn test_termination_interrupts_wait() {
        let mutex = Arc::new(UnfairMutex::new(()));
        let cond = HazardCondVar::new();
        let (tx, rx) = std::sync::mpsc::channel();

        let thread = {
            let mutex = Arc::clone(&mutex);
            let cond = cond.clone();
            ManagedThread::spawn("condvar-terminate", move || {
                let mut guard = mutex.lock();
                tx.send(cond.wait(&mut guard)).unwrap();
            })
            .unwrap()
        };

        wait_for_waiters(&cond, 1);
        thread.terminate(true);
        let result = rx.recv().unwrap();
        assert!(matches!(result, Err(Error::CancellationRequested)));
    }
}
