//! Synchronization primitives with cooperative cancellation
//!
//! Every blocking wait in this module registers a termination hazard on the
//! waiting thread, so terminating a [`ManagedThread`] wakes it promptly.

mod condvar;
mod event;
mod mutex;
mod rwlock;
mod thread;

pub use condvar::{HazardCondVar, WaitResult};
pub use event::EventGate;
pub use mutex::{UnfairMutex, UnfairMutexGuard, UnfairRwLock};
pub use rwlock::{ReadGuard, ReentrantRwLock, RwLockContext, WriteGuard};
pub use thread::{
    Hazard, HazardRegistration, ManagedThread, check_hazard_condition, is_termination_requested,
    register_hazard,
};
