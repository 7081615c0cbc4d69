//! Managed threads with cooperative termination
//!
//! A thread that should be cancellable runs as a [`ManagedThread`] (or is
//! adopted lazily the first time it touches this module). Long waits register a
//! [`Hazard`] on the waiting thread; [`ManagedThread::terminate`] raises the
//! termination flag and triggers every registered hazard so the waits wake up
//! and observe the request.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// A registered waiting condition that termination must unblock.
pub trait Hazard: Send + Sync {
    /// Wake whatever is blocked on this hazard.
    fn trigger(&self);
}

/// Termination state shared between a thread and everyone holding its handle.
pub(crate) struct ThreadState {
    id: ThreadId,
    name: String,
    terminate: AtomicBool,
    next_hazard: AtomicU64,
    hazards: Mutex<Vec<(u64, Arc<dyn Hazard>)>>,
}

impl ThreadState {
    fn new(id: ThreadId, name: String) -> Self {
        Self {
            id,
            name,
            terminate: AtomicBool::new(false),
            next_hazard: AtomicU64::new(1),
            hazards: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Register a hazard for the lifetime of the returned registration.
    pub(crate) fn register_hazard(self: &Arc<Self>, hazard: Arc<dyn Hazard>) -> HazardRegistration {
        let id = self.next_hazard.fetch_add(1, Ordering::Relaxed);
        self.hazards.lock().push((id, hazard));
        HazardRegistration {
            state: Arc::clone(self),
            id,
        }
    }

    fn request_termination(&self) {
        self.terminate.store(true, Ordering::SeqCst);

        // Snapshot first: a hazard's trigger may take locks a waiter holds while unregistering.
        let hazards: Vec<Arc<dyn Hazard>> =
            self.hazards.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        tracing::debug!(
            "terminating thread '{}' ({} active hazards)",
            self.name,
            hazards.len()
        );
        for hazard in hazards {
            hazard.trigger();
        }
    }
}

/// Keeps a hazard registered until dropped.
pub struct HazardRegistration {
    state: Arc<ThreadState>,
    id: u64,
}

impl Drop for HazardRegistration {
    fn drop(&mut self) {
        self.state.hazards.lock().retain(|(id, _)| *id != self.id);
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadState>>> = const { RefCell::new(None) };
}

/// State of the calling thread, adopting it on first use.
pub(crate) fn current_thread_state() -> Arc<ThreadState> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(state) = slot.as_ref() {
            return Arc::clone(state);
        }
        let thread = std::thread::current();
        let state = Arc::new(ThreadState::new(
            thread.id(),
            thread.name().unwrap_or("unnamed").to_string(),
        ));
        *slot = Some(Arc::clone(&state));
        state
    })
}

/// Register a hazard on the calling thread.
pub fn register_hazard(hazard: Arc<dyn Hazard>) -> HazardRegistration {
    current_thread_state().register_hazard(hazard)
}

/// Returns [`Error::CancellationRequested`] if the calling thread was asked to terminate.
///
/// Call this at safe points of long-running work.
pub fn check_hazard_condition() -> Result<()> {
    if current_thread_state().is_terminating() {
        Err(Error::CancellationRequested)
    } else {
        Ok(())
    }
}

/// Returns true if the calling thread was asked to terminate.
pub fn is_termination_requested() -> bool {
    current_thread_state().is_terminating()
}

/// Handle to a thread that supports cooperative termination.
#[derive(Clone)]
pub struct ManagedThread {
    state: Arc<ThreadState>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ManagedThread {
    /// Spawn a new named thread running `body`.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the OS refuses to create the thread.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = std::sync::mpsc::sync_channel::<Arc<ThreadState>>(1);

        let handle = std::thread::Builder::new().name(name.clone()).spawn(move || {
            let state = Arc::new(ThreadState::new(std::thread::current().id(), name));
            CURRENT.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&state)));
            if tx.send(state).is_ok() {
                body();
            }
        })?;

        let state = rx.recv().map_err(|_| {
            Error::Io(std::io::Error::other("managed thread exited before start-up"))
        })?;

        Ok(Self {
            state,
            join: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Handle for the calling thread. It cannot be joined.
    pub fn current() -> Self {
        Self {
            state: current_thread_state(),
            join: Arc::new(Mutex::new(None)),
        }
    }

    /// The OS thread id.
    pub fn id(&self) -> ThreadId {
        self.state.id
    }

    /// Thread name given at spawn time.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// True once termination was requested.
    pub fn is_terminating(&self) -> bool {
        self.state.is_terminating()
    }

    /// Request termination and wake every hazard registered on the thread.
    ///
    /// With `wait_on_remote` the call also joins the thread, unless it is the
    /// calling thread itself.
    pub fn terminate(&self, wait_on_remote: bool) {
        self.state.request_termination();
        if wait_on_remote && std::thread::current().id() != self.state.id {
            self.join();
        }
    }

    /// Reset the termination flag so the thread can take on new work.
    pub(crate) fn clear_termination(&self) {
        self.state.terminate.store(false, Ordering::SeqCst);
    }

    /// Block until the thread has exited. Returns immediately for non-joinable handles.
    pub fn join(&self) {
        let handle = self.join.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("managed thread '{}' panicked", self.state.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingHazard(AtomicUsize);

    impl Hazard for CountingHazard {
        fn trigger(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_terminate_triggers_registered_hazards() {
        let hazard = Arc::new(CountingHazard(AtomicUsize::new(0)));
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let hazard_clone = Arc::clone(&hazard);

        let thread = ManagedThread::spawn("hazard-test", move || {
            let _reg = register_hazard(hazard_clone);
            tx.send(()).unwrap();
            while check_hazard_condition().is_ok() {
                std::thread::yield_now();
            }
            done_tx.send(()).unwrap();
        })
        .unwrap();

        rx.recv().unwrap();
        thread.terminate(true);
        done_rx.recv().unwrap();
        assert_eq!(hazard.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_hazard_is_not_triggered() {
        let hazard = Arc::new(CountingHazard(AtomicUsize::new(0)));
        let thread = ManagedThread::spawn("unregister-test", {
            let hazard = Arc::clone(&hazard);
            move || {
                let reg = register_hazard(hazard);
                drop(reg);
            }
        })
        .unwrap();
        thread.join();
        thread.terminate(false);
        assert_eq!(hazard.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_self_termination_is_observed() {
        let thread = ManagedThread::spawn("self-terminate", || {
            assert!(check_hazard_condition().is_ok());
            ManagedThread::current().terminate(true);
            assert!(matches!(
                check_hazard_condition(),
                Err(Error::CancellationRequested)
            ));
        })
        .unwrap();
        thread.join();
    }
}
