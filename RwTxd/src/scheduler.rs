//! Single-worker action queue
//!
//! Long-running work (batch conversions, imports) is queued on an
//! [`ActionSystem`] and runs on one dedicated [`ManagedThread`] in submission
//! order. The host is told when each action starts and stops, receives status
//! messages, and gets every failure, panics included. Cancelling terminates
//! the worker's current action through the thread's hazards; the worker
//! itself keeps running.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::engine::{Engine, ScopeKind};
use crate::error::{Error, Result};
use crate::sync::{EventGate, HazardCondVar, ManagedThread, UnfairMutex, check_hazard_condition};

/// Why an action did not complete.
#[derive(Debug)]
pub enum ActionFailure {
    /// The action was cancelled and unwound cleanly.
    Cancelled,
    /// The action returned an error.
    Error(Error),
    /// The action panicked; holds the panic message.
    Panic(String),
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Error(err) => write!(f, "{err}"),
            Self::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Callbacks from the worker thread to whoever owns the queue.
pub trait ActionHost: Send + Sync {
    /// Before an action runs.
    fn on_start_action(&self, _name: &str) {}

    /// After an action ends, however it ends.
    fn on_stop_action(&self, _name: &str) {}

    /// Progress text from the running action.
    fn on_update_status_message(&self, _message: &str) {}

    /// The running action failed.
    fn report_exception(&self, _name: &str, _failure: &ActionFailure) {}
}

/// Host that only logs.
#[derive(Debug, Default)]
pub struct LoggingActionHost;

impl ActionHost for LoggingActionHost {
    fn on_update_status_message(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn report_exception(&self, name: &str, failure: &ActionFailure) {
        tracing::error!("action '{}' failed: {}", name, failure);
    }
}

/// Handed to a running action.
pub struct ActionContext<'a> {
    name: &'a str,
    engine: &'a Engine,
    host: &'a dyn ActionHost,
}

impl ActionContext<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Forward a progress message to the host.
    pub fn update_status(&self, message: &str) {
        self.host.on_update_status_message(message);
    }

    /// Returns [`Error::CancellationRequested`] once the action was cancelled.
    ///
    /// # Errors
    /// See above.
    pub fn check_cancelled(&self) -> Result<()> {
        check_hazard_condition()
    }
}

type ActionBody = Box<dyn FnOnce(&ActionContext<'_>) -> Result<()> + Send>;

struct QueuedAction {
    id: u64,
    name: String,
    body: ActionBody,
}

struct SchedulerShared {
    engine: Engine,
    host: Arc<dyn ActionHost>,
    queue: UnfairMutex<VecDeque<QueuedAction>>,
    queue_cond: HazardCondVar,
    /// Closed while actions are queued or running.
    busy: EventGate,
    /// Id of the running action, 0 when idle. Only changed under `queue`.
    current: AtomicU64,
    shutting_down: AtomicBool,
    next_id: AtomicU64,
}

/// Cancels the running action of an [`ActionSystem`] from any thread.
///
/// Handed to interrupt handlers that outlive a borrow of the system.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<SchedulerShared>,
    worker: ManagedThread,
}

impl CancelHandle {
    /// Cancel the running action, if any.
    pub fn cancel(&self) {
        let _queue = self.shared.queue.lock();
        if self.shared.current.load(Ordering::SeqCst) != 0 {
            self.worker.terminate(false);
        }
    }
}

/// FIFO action queue served by one worker thread.
pub struct ActionSystem {
    shared: Arc<SchedulerShared>,
    worker: ManagedThread,
}

impl ActionSystem {
    /// Start the worker thread.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn new(engine: Engine, host: Arc<dyn ActionHost>) -> Result<Self> {
        let shared = Arc::new(SchedulerShared {
            engine,
            host,
            queue: UnfairMutex::new(VecDeque::new()),
            queue_cond: HazardCondVar::new(),
            busy: EventGate::new(false),
            current: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = ManagedThread::spawn("rwtxd-actions", move || worker_loop(&worker_shared))?;
        Ok(Self { shared, worker })
    }

    /// Queue an action. Returns its id immediately.
    pub fn launch_action<F>(&self, name: impl Into<String>, body: F) -> u64
    where
        F: FnOnce(&ActionContext<'_>) -> Result<()> + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        tracing::debug!("queued action #{} '{}'", id, name);
        let mut queue = self.shared.queue.lock();
        queue.push_back(QueuedAction {
            id,
            name,
            body: Box::new(body),
        });
        self.shared.busy.set(true);
        self.shared.queue_cond.signal();
        id
    }

    /// Number of actions waiting to run.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// True while an action runs.
    pub fn is_running(&self) -> bool {
        self.current_action().is_some()
    }

    /// Id of the running action.
    pub fn current_action(&self) -> Option<u64> {
        match self.shared.current.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Cancel the running action, if any. Queued actions still run.
    pub fn cancel_current(&self) {
        self.cancel_handle().cancel();
    }

    /// Handle that cancels whatever action is running when it is used.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
            worker: self.worker.clone(),
        }
    }

    /// Cancel action `id` if it is the one running. Returns false if it
    /// already finished or has not started.
    pub fn cancel_action(&self, id: u64) -> bool {
        let _queue = self.shared.queue.lock();
        if id == 0 || self.shared.current.load(Ordering::SeqCst) != id {
            return false;
        }
        self.worker.terminate(false);
        true
    }

    /// Drop every queued action that has not started.
    pub fn clear_queue(&self) -> usize {
        let mut queue = self.shared.queue.lock();
        let dropped = queue.len();
        queue.clear();
        if !self.is_running() {
            self.shared.busy.set(false);
        }
        dropped
    }

    /// Block until the queue is empty and no action runs.
    ///
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the calling thread is terminated.
    pub fn wait_for_idle(&self) -> Result<()> {
        self.shared.busy.wait()
    }

    /// Stop the worker after the running action, discarding queued ones.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.clear_queue();
        if dropped > 0 {
            tracing::warn!("discarded {} queued actions on shutdown", dropped);
        }
        self.worker.terminate(true);
        self.shared.busy.set(false);
    }
}

impl Drop for ActionSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &SchedulerShared) {
    let this_thread = ManagedThread::current();
    loop {
        let action = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(action) = queue.pop_front() {
                    shared.current.store(action.id, Ordering::SeqCst);
                    break action;
                }
                shared.busy.set(false);
                if shared.queue_cond.wait(&mut queue).is_err() && !shared.shutting_down.load(Ordering::SeqCst) {
                    this_thread.clear_termination();
                }
            }
        };

        run_action(shared, action);

        // A cancel either lands before this point and is discarded with the
        // finished action, or sees no current action and does nothing.
        let _queue = shared.queue.lock();
        shared.current.store(0, Ordering::SeqCst);
        if !shared.shutting_down.load(Ordering::SeqCst) {
            this_thread.clear_termination();
        }
    }
}

/// Calls `on_stop_action` on every exit path.
struct StopGuard<'a> {
    host: &'a dyn ActionHost,
    name: &'a str,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.host.on_stop_action(self.name);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_action(shared: &SchedulerShared, action: QueuedAction) {
    let QueuedAction { id, name, body } = action;
    let host = shared.host.as_ref();
    tracing::debug!("running action #{} '{}'", id, name);

    // Warnings raised by the action reach the user when it ends.
    let _warnings = shared.engine.warnings().scope(ScopeKind::Buffer);
    host.on_start_action(&name);
    let _stop = StopGuard { host, name: &name };

    let context = ActionContext {
        name: &name,
        engine: &shared.engine,
        host,
    };
    let failure = match catch_unwind(AssertUnwindSafe(|| body(&context))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) if err.is_cancellation() => Some(ActionFailure::Cancelled),
        Ok(Err(err)) => Some(ActionFailure::Error(err)),
        Err(payload) => Some(ActionFailure::Panic(panic_message(payload.as_ref()))),
    };
    if let Some(failure) = failure {
        tracing::debug!("action #{} '{}' ended: {}", id, name, failure);
        host.report_exception(&name, &failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    #[derive(Default)]
    struct RecordingHost(UnfairMutex<Vec<String>>);

    impl ActionHost for RecordingHost {
        fn on_start_action(&self, name: &str) {
            self.0.lock().push(format!("start {name}"));
        }

        fn on_stop_action(&self, name: &str) {
            self.0.lock().push(format!("stop {name}"));
        }

        fn on_update_status_message(&self, message: &str) {
            self.0.lock().push(format!("status {message}"));
        }

        fn report_exception(&self, name: &str, failure: &ActionFailure) {
            let kind = match failure {
                ActionFailure::Cancelled => "cancelled",
                ActionFailure::Error(_) => "error",
                ActionFailure::Panic(_) => "panic",
            };
            self.0.lock().push(format!("{kind} {name}"));
        }
    }

    fn system() -> (ActionSystem, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        let system = ActionSystem::new(Engine::new(), host.clone()).unwrap();
        (system, host)
    }

    #[test]
    fn test_actions_run_in_order() {
        let (system, host) = system();
        let order = Arc::new(UnfairMutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            system.launch_action(format!("a{i}"), move |ctx| {
                ctx.update_status(&format!("step {i}"));
                order.lock().push(i);
                Ok(())
            });
        }
        system.wait_for_idle().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(
            host.0.lock()[..3],
            ["start a0".to_string(), "status step 0".to_string(), "stop a0".to_string()]
        );
    }

    #[test]
    fn test_failures_are_reported_and_worker_survives() {
        let (system, host) = system();
        system.launch_action("bad", |_| Err(Error::codec("kernel exploded")));
        system.launch_action("worse", |_| panic!("boom"));
        system.launch_action("fine", |_| Ok(()));
        system.wait_for_idle().unwrap();
        assert_eq!(
            *host.0.lock(),
            vec![
                "start bad", "error bad", "stop bad", "start worse", "panic worse", "stop worse",
                "start fine", "stop fine",
            ]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_cancel_interrupts_blocking_wait() {
        let (system, host) = system();
        let (started_tx, started_rx) = mpsc::channel();
        system.launch_action("blocked", move |_| {
            let never = EventGate::new(true);
            started_tx.send(()).unwrap();
            never.wait()
        });
        started_rx.recv().unwrap();
        system.cancel_current();
        system.wait_for_idle().unwrap();

        let events = host.0.lock().clone();
        assert!(events.contains(&"cancelled blocked".to_string()));

        // The next action is not affected by the previous cancel.
        system.launch_action("after", |ctx| ctx.check_cancelled());
        system.wait_for_idle().unwrap();
        assert_eq!(host.0.lock().last().map(String::as_str), Some("stop after"));
    }

    #[test]
    fn test_cancel_by_id_ignores_finished_action() {
        let (system, host) = system();
        let first = system.launch_action("first", |_| Ok(()));
        system.wait_for_idle().unwrap();
        assert_eq!(system.current_action(), None);

        let (started_tx, started_rx) = mpsc::channel();
        let release = Arc::new(EventGate::new(true));
        let gate = Arc::clone(&release);
        let second = system.launch_action("second", move |ctx| {
            started_tx.send(()).unwrap();
            gate.wait()?;
            ctx.check_cancelled()
        });
        started_rx.recv().unwrap();
        assert_eq!(system.current_action(), Some(second));

        // A late cancel aimed at the first action must not reach the second.
        assert!(!system.cancel_action(first));
        release.set(false);
        system.wait_for_idle().unwrap();
        assert!(!host.0.lock().iter().any(|event| event.starts_with("cancelled")));

        let (started_tx, started_rx) = mpsc::channel();
        let third = system.launch_action("third", move |_| {
            started_tx.send(()).unwrap();
            EventGate::new(true).wait()
        });
        started_rx.recv().unwrap();
        assert!(system.cancel_action(third));
        system.wait_for_idle().unwrap();
        assert_eq!(
            host.0.lock().iter().filter(|event| event.starts_with("cancelled")).cloned().collect::<Vec<_>>(),
            vec!["cancelled third".to_string()]
        );
    }
}
