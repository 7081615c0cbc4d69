//! Reentrant reader/writer lock with per-thread contexts
//!
//! The lock keeps a table of holders keyed by thread. A thread that already
//! holds the lock in any mode may nest further read contexts, a writer may nest
//! writes and reads, and a thread that is the only reader may upgrade to writer.
//! Waiting threads queue in FIFO order; consecutive readers at the head of the
//! queue are admitted together, a writer at the head holds back everyone behind it.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::thread::ThreadId;

use parking_lot::Mutex;

use super::condvar::HazardCondVar;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
struct Holding {
    reads: u32,
    writes: u32,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: u64,
    write: bool,
}

#[derive(Default)]
struct LockState {
    holders: HashMap<ThreadId, Holding>,
    writer: Option<ThreadId>,
    upgrading: Option<ThreadId>,
    queue: VecDeque<Ticket>,
    next_ticket: u64,
}

impl LockState {
    fn reader_threads(&self) -> usize {
        self.holders.values().filter(|h| h.reads > 0).count()
    }

    /// All tickets ahead of `id` are readers.
    fn only_readers_ahead(&self, id: u64) -> bool {
        self.queue.iter().take_while(|t| t.id != id).all(|t| !t.write)
    }

    fn is_head(&self, id: u64) -> bool {
        self.queue.front().is_some_and(|t| t.id == id)
    }

    fn remove_ticket(&mut self, id: u64) {
        self.queue.retain(|t| t.id != id);
    }

    fn enqueue(&mut self, write: bool) -> u64 {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back(Ticket { id, write });
        id
    }
}

/// Reentrant reader/writer lock guarding a logical resource.
///
/// The lock does not own data; callers pair it with their own storage.
#[derive(Default)]
pub struct ReentrantRwLock {
    state: Mutex<LockState>,
    cond: HazardCondVar,
}

impl ReentrantRwLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the calling thread. Contexts cannot leave the thread they were created on.
    pub fn context(&self) -> RwLockContext<'_> {
        RwLockContext {
            lock: self,
            thread: std::thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// Shared access for the calling thread.
    ///
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the thread is terminated while waiting.
    pub fn read(&self) -> Result<ReadGuard<'_>> {
        self.context().read()
    }

    /// Exclusive access for the calling thread.
    ///
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the thread is terminated while waiting,
    /// or [`Error::LockUpgradeConflict`] if another reader is already upgrading.
    pub fn write(&self) -> Result<WriteGuard<'_>> {
        self.context().write()
    }

    /// True if any thread holds the lock for writing.
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    fn enter_read(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(holding) = state.holders.get_mut(&thread)
            && (holding.reads > 0 || holding.writes > 0)
        {
            holding.reads += 1;
            return Ok(());
        }

        if state.writer.is_none() && state.upgrading.is_none() && state.queue.is_empty() {
            state.holders.entry(thread).or_default().reads += 1;
            return Ok(());
        }

        let ticket = state.enqueue(false);
        loop {
            if state.writer.is_none()
                && state.upgrading.is_none()
                && state.only_readers_ahead(ticket)
            {
                state.remove_ticket(ticket);
                state.holders.entry(thread).or_default().reads += 1;
                // Readers queued behind us may be admitted too.
                self.cond.signal();
                return Ok(());
            }
            if let Err(err) = self.cond.wait(&mut state) {
                state.remove_ticket(ticket);
                self.cond.signal();
                return Err(err);
            }
        }
    }

    fn enter_write(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();

        if state.writer == Some(thread) {
            if let Some(holding) = state.holders.get_mut(&thread) {
                holding.writes += 1;
            }
            return Ok(());
        }

        let holds_read = state.holders.get(&thread).is_some_and(|h| h.reads > 0);
        if holds_read {
            if state.upgrading.is_some() {
                return Err(Error::LockUpgradeConflict);
            }
            state.upgrading = Some(thread);
            loop {
                if state.writer.is_none() && state.reader_threads() == 1 {
                    state.upgrading = None;
                    state.writer = Some(thread);
                    state.holders.entry(thread).or_default().writes += 1;
                    return Ok(());
                }
                if let Err(err) = self.cond.wait(&mut state) {
                    state.upgrading = None;
                    self.cond.signal();
                    return Err(err);
                }
            }
        }

        let ticket = state.enqueue(true);
        loop {
            if state.is_head(ticket)
                && state.writer.is_none()
                && state.upgrading.is_none()
                && state.reader_threads() == 0
            {
                state.remove_ticket(ticket);
                state.writer = Some(thread);
                state.holders.entry(thread).or_default().writes += 1;
                return Ok(());
            }
            if let Err(err) = self.cond.wait(&mut state) {
                state.remove_ticket(ticket);
                self.cond.signal();
                return Err(err);
            }
        }
    }

    fn leave_read(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();
        let holding = state
            .holders
            .get_mut(&thread)
            .filter(|h| h.reads > 0)
            .ok_or_else(|| Error::BlockContextUnbalanced {
                message: "leave_read without matching enter_read".to_string(),
            })?;
        holding.reads -= 1;
        if holding.reads == 0 && holding.writes == 0 {
            state.holders.remove(&thread);
        }
        self.cond.signal();
        Ok(())
    }

    fn leave_write(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();
        if state.writer != Some(thread) {
            return Err(Error::BlockContextUnbalanced {
                message: "leave_write by a thread that is not the writer".to_string(),
            });
        }
        let mut released = false;
        if let Some(holding) = state.holders.get_mut(&thread) {
            holding.writes -= 1;
            if holding.writes == 0 {
                released = true;
                if holding.reads == 0 {
                    state.holders.remove(&thread);
                }
            }
        }
        if released {
            state.writer = None;
        }
        self.cond.signal();
        Ok(())
    }
}

/// Per-thread handle for entering and leaving a [`ReentrantRwLock`].
///
/// Every `enter_*` must be matched by the corresponding `leave_*` on the same
/// context. The guard methods do this automatically.
pub struct RwLockContext<'a> {
    lock: &'a ReentrantRwLock,
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl<'a> RwLockContext<'a> {
    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the thread is terminated while waiting.
    pub fn enter_read(&self) -> Result<()> {
        self.lock.enter_read(self.thread)
    }

    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if no read context is held.
    pub fn leave_read(&self) -> Result<()> {
        self.lock.leave_read(self.thread)
    }

    /// # Errors
    /// Returns [`Error::CancellationRequested`] if the thread is terminated while waiting,
    /// or [`Error::LockUpgradeConflict`] when upgrading races another upgrader.
    pub fn enter_write(&self) -> Result<()> {
        self.lock.enter_write(self.thread)
    }

    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if the thread is not the writer.
    pub fn leave_write(&self) -> Result<()> {
        self.lock.leave_write(self.thread)
    }

    /// Enter a read context released when the guard drops.
    ///
    /// # Errors
    /// See [`enter_read`](Self::enter_read).
    pub fn read(&self) -> Result<ReadGuard<'a>> {
        self.enter_read()?;
        Ok(ReadGuard {
            lock: self.lock,
            thread: self.thread,
            _not_send: PhantomData,
        })
    }

    /// Enter a write context released when the guard drops.
    ///
    /// # Errors
    /// See [`enter_write`](Self::enter_write).
    pub fn write(&self) -> Result<WriteGuard<'a>> {
        self.enter_write()?;
        Ok(WriteGuard {
            lock: self.lock,
            thread: self.thread,
            _not_send: PhantomData,
        })
    }
}

/// Shared access, released on drop.
pub struct ReadGuard<'a> {
    lock: &'a ReentrantRwLock,
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.leave_read(self.thread) {
            tracing::error!("{err}");
        }
    }
}

/// Exclusive access, released on drop.
pub struct WriteGuard<'a> {
    lock: &'a ReentrantRwLock,
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.leave_write(self.thread) {
            tracing::error!("{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ManagedThread;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_nested_reads_and_writes() {
        let lock = ReentrantRwLock::new();
        let ctx = lock.context();
        let w1 = ctx.write().unwrap();
        let w2 = ctx.write().unwrap();
        let r = ctx.read().unwrap();
        assert!(lock.is_write_locked());
        drop(r);
        drop(w2);
        assert!(lock.is_write_locked());
        drop(w1);
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn test_sole_reader_upgrades() {
        let lock = ReentrantRwLock::new();
        let ctx = lock.context();
        let r = ctx.read().unwrap();
        let w = ctx.write().unwrap();
        assert!(lock.is_write_locked());
        drop(w);
        drop(r);
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn test_unbalanced_leave_is_reported() {
        let lock = ReentrantRwLock::new();
        let ctx = lock.context();
        assert!(matches!(
            ctx.leave_read(),
            Err(Error::BlockContextUnbalanced { .. })
        ));
        assert!(matches!(
            ctx.leave_write(),
            Err(Error::BlockContextUnbalanced { .. })
        ));
    }

    #[test]
    fn test_writer_excludes_other_threads() {
        let lock = Arc::new(ReentrantRwLock::new());
        let entered = Arc::new(AtomicBool::new(false));
        let guard = lock.write().unwrap();

        let reader = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            std::thread::spawn(move || {
                let _r = lock.read().unwrap();
                entered.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(30));
        assert!(!entered.load(Ordering::SeqCst));
        drop(guard);
        reader.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_upgrade_conflicts() {
        let lock = Arc::new(ReentrantRwLock::new());
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (result_tx, result_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let main_read = lock.read().unwrap();
        let other = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                let _r = lock.read().unwrap();
                ready_tx.send(()).unwrap();
                // Blocks: the main thread also reads, so this upgrade waits.
                let upgraded = lock.write().map(|_| ());
                result_tx.send(upgraded).unwrap();
                release_rx.recv().unwrap();
            })
        };

        ready_rx.recv().unwrap();
        while lock.state.lock().upgrading.is_none() {
            std::thread::yield_now();
        }
        assert!(matches!(lock.write(), Err(Error::LockUpgradeConflict)));

        drop(main_read);
        assert!(result_rx.recv().unwrap().is_ok());
        release_tx.send(()).unwrap();
        other.join().unwrap();
    }

    #[test]
    fn test_termination_interrupts_lock_wait() {
        let lock = Arc::new(ReentrantRwLock::new());
        let guard = lock.write().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        let thread = {
            let lock = Arc::clone(&lock);
            ManagedThread::spawn("rwlock-terminate", move || {
                tx.send(lock.read().map(|_| ())).unwrap();
            })
            .unwrap()
        };

        while lock.state.lock().queue.is_empty() {
            std::thread::yield_now();
        }
        thread.terminate(true);
        assert!(matches!(
            rx.recv().unwrap(),
            Err(Error::CancellationRequested)
        ));
        assert!(lock.state.lock().queue.is_empty());
        drop(guard);
    }
}
