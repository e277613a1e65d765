//! Per-execution pause/resume state machine.

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::error::DebugError;
use crate::event::BreakpointEvent;
use crate::handle::ExecutionHandle;

/// Whether a context's execution thread is free to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// The execution thread is running script code.
    Running,
    /// The execution thread is parked until a resume.
    Paused,
}

/// State guarded by a context's mutex.
#[derive(Debug)]
pub struct ContextState {
    state: RunState,
    pause_info: Option<BreakpointEvent>,
    closed: bool,
}

impl ContextState {
    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.state
    }
}

/// How an execution thread parks while its context is paused.
///
/// Implementations are called with the context mutex held and must only
/// block on `cond`; the caller re-checks the state after every wakeup.
pub trait WaitStrategy: Send + Sync {
    /// Block once on `cond`.
    fn park(&self, cond: &Condvar, guard: &mut MutexGuard<'_, ContextState>);
}

/// Block until explicitly resumed. There is no timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Indefinite;

impl WaitStrategy for Indefinite {
    fn park(&self, cond: &Condvar, guard: &mut MutexGuard<'_, ContextState>) {
        cond.wait(guard);
    }
}

/// One execution handle under debugging.
///
/// `pause` and `wait_while_paused` are called back to back on the execution
/// thread; `resume` comes from a command thread.
#[derive(Debug)]
pub struct DebugContext {
    handle: ExecutionHandle,
    name: String,
    inner: Mutex<ContextState>,
    resumed: Condvar,
}

impl DebugContext {
    /// Create a running context.
    pub fn new(handle: ExecutionHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            inner: Mutex::new(ContextState {
                state: RunState::Running,
                pause_info: None,
                closed: false,
            }),
            resumed: Condvar::new(),
        }
    }

    pub fn handle(&self) -> ExecutionHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// The event the context is paused at, if any.
    pub fn pause_info(&self) -> Option<BreakpointEvent> {
        self.inner.lock().pause_info.clone()
    }

    /// Transition Running → Paused, remembering where.
    ///
    /// Pausing an already paused context is a caller bug and is rejected.
    /// A closed context refuses to pause at all.
    pub fn pause(&self, info: BreakpointEvent) -> Result<(), DebugError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(DebugError::UnknownContext(self.handle));
        }
        if inner.state == RunState::Paused {
            tracing::error!(handle = %self.handle, "pause requested on a paused context");
            return Err(DebugError::AlreadyPaused(self.handle));
        }
        tracing::debug!(handle = %self.handle, location = %info.location(), "context paused");
        inner.state = RunState::Paused;
        inner.pause_info = Some(info);
        Ok(())
    }

    /// Transition Paused → Running and wake every waiter.
    ///
    /// Returns `false` if the context was already running.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == RunState::Running {
            return false;
        }
        inner.state = RunState::Running;
        inner.pause_info = None;
        self.resumed.notify_all();
        tracing::debug!(handle = %self.handle, "context resumed");
        true
    }

    /// Force the context to run and refuse any later pause. Used when the
    /// context is removed from the registry. Returns whether it was paused.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let was_paused = inner.state == RunState::Paused;
        inner.state = RunState::Running;
        inner.pause_info = None;
        self.resumed.notify_all();
        was_paused
    }

    /// Block until the context is running. Returns at once if it already is.
    pub fn wait_while_paused(&self) {
        self.wait_while_paused_with(&Indefinite);
    }

    /// [`wait_while_paused`](Self::wait_while_paused) with a custom parking strategy.
    pub fn wait_while_paused_with(&self, strategy: &dyn WaitStrategy) {
        let mut inner = self.inner.lock();
        while inner.state == RunState::Paused {
            strategy.park(&self.resumed, &mut inner);
        }
    }
}
