//! Unfair exclusive and reader/writer locks
//!
//! Thin wrappers over `parking_lot` that give the crate one place to name its
//! lock types. Neither lock is reentrant; a thread that locks twice deadlocks.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Guard returned by [`UnfairMutex::lock`].
pub type UnfairMutexGuard<'a, T> = MutexGuard<'a, T>;

/// Exclusive, non-reentrant mutex. A release wakes a single waiter.
#[derive(Debug, Default)]
pub struct UnfairMutex<T> {
    inner: Mutex<T>,
}

impl<T> UnfairMutex<T> {
    /// Create an unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Block until the lock is held.
    pub fn lock(&self) -> UnfairMutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Take the lock if nobody holds it.
    pub fn try_lock(&self) -> Option<UnfairMutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Access the value without locking; requires exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the mutex and return the value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Non-reentrant reader/writer lock for process-wide state that never recurses.
#[derive(Debug, Default)]
pub struct UnfairRwLock<T> {
    inner: RwLock<T>,
}

impl<T> UnfairRwLock<T> {
    /// Create an unlocked lock.
    pub const fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Shared access.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Consume the lock and return the value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
