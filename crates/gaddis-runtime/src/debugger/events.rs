//! Notifications from the session worker to its host.

use crate::vm::VmPanic;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Entry,
    Pause,
    Step,
    Breakpoint,
    Exception,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::Entry => "entry",
            PauseReason::Pause => "pause",
            PauseReason::Step => "step",
            PauseReason::Breakpoint => "breakpoint",
            PauseReason::Exception => "exception",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of session events.
///
/// Called from the worker thread after it has released the session lock, so
/// implementations may query the session. They must not call
/// [`DebugSession::wait`](super::DebugSession::wait) or
/// [`DebugSession::halt`](super::DebugSession::halt), which join the worker.
pub trait EventHost: Send + Sync {
    fn paused(&self, reason: PauseReason);
    /// An error stopped a debuggable run; the session is paused on it
    fn exception(&self, panic: &VmPanic);
    /// An error ended a no-debug run
    fn panicked(&self, panic: &VmPanic);
    fn exited(&self, code: i32);
    fn terminated(&self);
}

/// Forwards events to a host unless suppressed.
pub struct EventGate {
    host: Arc<dyn EventHost>,
    suppressed: AtomicBool,
}

impl EventGate {
    pub fn new(host: Arc<dyn EventHost>) -> Self {
        Self {
            host,
            suppressed: AtomicBool::new(false),
        }
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    fn host(&self) -> Option<&dyn EventHost> {
        if self.is_suppressed() {
            None
        } else {
            Some(self.host.as_ref())
        }
    }

    pub fn paused(&self, reason: PauseReason) {
        if let Some(host) = self.host() {
            host.paused(reason);
        }
    }

    pub fn exception(&self, panic: &VmPanic) {
        if let Some(host) = self.host() {
            host.exception(panic);
        }
    }

    pub fn panicked(&self, panic: &VmPanic) {
        if let Some(host) = self.host() {
            host.panicked(panic);
        }
    }

    pub fn exited(&self, code: i32) {
        if let Some(host) = self.host() {
            host.exited(code);
        }
    }

    pub fn terminated(&self) {
        if let Some(host) = self.host() {
            host.terminated();
        }
    }
}

impl fmt::Debug for EventGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGate")
            .field("suppressed", &self.is_suppressed())
            .finish_non_exhaustive()
    }
}
