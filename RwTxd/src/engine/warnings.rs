//! User-visible warning channel
//!
//! Warnings are separate from the `tracing` log: they are the messages a user
//! sees about the files they process, filtered by the engine's warning level.
//! Code that wants to defer or suppress them opens a [`WarningScope`] on the
//! current thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use crate::sync::{UnfairMutex, UnfairRwLock};

/// Importance of a warning. A warning is shown when its level does not
/// exceed the configured warning level (0 shows nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WarningLevel {
    /// Data was lost or a file could not be processed as requested.
    Critical = 1,
    /// The input is unusual and was repaired or reinterpreted.
    Important = 2,
    /// Informational notes about conversions.
    Info = 3,
    /// Chatty details.
    Verbose = 4,
}

/// Receives warnings that pass all filters and scopes.
pub trait WarningSink: Send + Sync {
    fn on_warning(&self, message: &str);
}

/// Default sink: forwards to the `tracing` log.
#[derive(Debug, Default)]
pub struct TracingWarningSink;

impl WarningSink for TracingWarningSink {
    fn on_warning(&self, message: &str) {
        tracing::warn!(target: "rwtxd::warnings", "{message}");
    }
}

/// How a scope treats the warnings raised inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Collect warnings; the owner decides what to do with them.
    Capture,
    /// Drop every warning.
    Silence,
    /// Collect warnings and pass them on when the scope ends.
    Buffer,
}

enum Frame {
    Capture(Vec<String>),
    Silence,
    Buffer(Vec<String>),
}

/// Routes warnings to per-thread scopes or the installed sink.
pub struct WarningManager {
    sink: UnfairRwLock<Arc<dyn WarningSink>>,
    frames: UnfairMutex<HashMap<ThreadId, Vec<Frame>>>,
}

impl Default for WarningManager {
    fn default() -> Self {
        Self {
            sink: UnfairRwLock::new(Arc::new(TracingWarningSink)),
            frames: UnfairMutex::new(HashMap::new()),
        }
    }
}

impl WarningManager {
    /// Replace the sink that receives unscoped warnings.
    pub fn set_sink(&self, sink: Arc<dyn WarningSink>) {
        *self.sink.write() = sink;
    }

    /// True if the innermost scope of the calling thread drops warnings.
    pub fn is_silenced(&self) -> bool {
        let frames = self.frames.lock();
        matches!(
            frames
                .get(&std::thread::current().id())
                .and_then(|stack| stack.last()),
            Some(Frame::Silence)
        )
    }

    /// Route a message that already passed level filtering.
    pub(crate) fn dispatch(&self, message: String) {
        {
            let mut frames = self.frames.lock();
            if let Some(top) = frames
                .get_mut(&std::thread::current().id())
                .and_then(|stack| stack.last_mut())
            {
                match top {
                    Frame::Silence => {}
                    Frame::Capture(buffer) | Frame::Buffer(buffer) => buffer.push(message),
                }
                return;
            }
        }
        let sink = Arc::clone(&self.sink.read());
        sink.on_warning(&message);
    }

    /// Open a scope on the calling thread.
    pub fn scope(&self, kind: ScopeKind) -> WarningScope<'_> {
        let frame = match kind {
            ScopeKind::Capture => Frame::Capture(Vec::new()),
            ScopeKind::Silence => Frame::Silence,
            ScopeKind::Buffer => Frame::Buffer(Vec::new()),
        };
        let thread = std::thread::current().id();
        let depth = {
            let mut frames = self.frames.lock();
            let stack = frames.entry(thread).or_default();
            stack.push(frame);
            stack.len()
        };
        WarningScope {
            manager: self,
            thread,
            depth,
            closed: false,
        }
    }

    fn pop(&self, thread: ThreadId, depth: usize) -> Option<Frame> {
        let mut frames = self.frames.lock();
        let stack = frames.get_mut(&thread)?;
        if stack.len() != depth {
            tracing::error!(
                "warning scopes closed out of order (depth {depth}, {} open)",
                stack.len()
            );
        }
        let frame = stack.pop();
        if stack.is_empty() {
            frames.remove(&thread);
        }
        frame
    }
}

/// A warning scope on one thread, closed when dropped.
///
/// Dropping a `Buffer` scope flushes its warnings to the enclosing scope;
/// dropping a `Capture` scope discards them.
#[must_use = "a scope closes as soon as it is dropped"]
pub struct WarningScope<'a> {
    manager: &'a WarningManager,
    thread: ThreadId,
    depth: usize,
    closed: bool,
}

impl WarningScope<'_> {
    /// Close the scope and return what it collected.
    pub fn finish(mut self) -> Vec<String> {
        self.closed = true;
        match self.manager.pop(self.thread, self.depth) {
            Some(Frame::Capture(messages) | Frame::Buffer(messages)) => messages,
            _ => Vec::new(),
        }
    }

    /// Close the scope and pass its warnings to the enclosing scope.
    pub fn flush(self) {
        let manager = self.manager;
        for message in self.finish() {
            manager.dispatch(message);
        }
    }
}

impl Drop for WarningScope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(Frame::Buffer(messages)) = self.manager.pop(self.thread, self.depth) {
            for message in messages {
                self.manager.dispatch(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    pub(crate) struct CollectingSink(pub UnfairMutex<Vec<String>>);

    impl WarningSink for CollectingSink {
        fn on_warning(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    #[test]
    fn test_unscoped_warnings_reach_sink() {
        let manager = WarningManager::default();
        let sink = Arc::new(CollectingSink::default());
        manager.set_sink(sink.clone());
        manager.dispatch("hello".to_string());
        assert_eq!(*sink.0.lock(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_capture_scope_collects() {
        let manager = WarningManager::default();
        let sink = Arc::new(CollectingSink::default());
        manager.set_sink(sink.clone());

        let scope = manager.scope(ScopeKind::Capture);
        manager.dispatch("captured".to_string());
        assert_eq!(scope.finish(), vec!["captured".to_string()]);
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_silence_inside_buffer() {
        let manager = WarningManager::default();
        let sink = Arc::new(CollectingSink::default());
        manager.set_sink(sink.clone());

        let buffer = manager.scope(ScopeKind::Buffer);
        manager.dispatch("first".to_string());
        {
            let _silence = manager.scope(ScopeKind::Silence);
            assert!(manager.is_silenced());
            manager.dispatch("dropped".to_string());
        }
        manager.dispatch("second".to_string());
        assert!(sink.0.lock().is_empty());
        drop(buffer);
        assert_eq!(
            *sink.0.lock(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_flushed_capture_goes_to_outer_scope() {
        let manager = WarningManager::default();
        let outer = manager.scope(ScopeKind::Capture);
        let inner = manager.scope(ScopeKind::Capture);
        manager.dispatch("inner".to_string());
        inner.flush();
        assert_eq!(outer.finish(), vec!["inner".to_string()]);
    }
}
