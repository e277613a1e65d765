//! The execution registry: which handles are being debugged, and the entry
//! point for hook events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::{CommandBridge, RemoteDispatch, RemoteHandler};
use crate::context::{DebugContext, Indefinite, WaitStrategy};
use crate::dispatcher;
use crate::error::DebugError;
use crate::event::{BreakpointEvent, RawHookEvent};
use crate::handle::ExecutionHandle;
use crate::host::{HostRuntime, MessageSink};

/// Owns every [`DebugContext`] and routes hook events and client commands.
///
/// Shared between execution threads (hook events) and command threads
/// (client messages), typically behind an `Arc`.
pub struct Debugger {
    contexts: Mutex<HashMap<ExecutionHandle, Arc<DebugContext>>>,
    host: Arc<dyn HostRuntime>,
    remote: RemoteDispatch,
    sink: Arc<dyn MessageSink>,
    listening: AtomicBool,
    wait: Box<dyn WaitStrategy>,
}

impl Debugger {
    /// Create a registry with no contexts that listens for hook events.
    pub fn new(
        host: Arc<dyn HostRuntime>,
        handler: Box<dyn RemoteHandler>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            host,
            remote: RemoteDispatch::new(handler),
            sink,
            listening: AtomicBool::new(true),
            wait: Box::new(Indefinite),
        }
    }

    /// Replace how paused execution threads park.
    pub fn with_wait_strategy(mut self, wait: Box<dyn WaitStrategy>) -> Self {
        self.wait = wait;
        self
    }

    /// Register a context for `handle`. Returns `false`, leaving the existing
    /// context untouched, if the handle is already registered.
    pub fn start_debugging(&self, handle: ExecutionHandle, name: &str) -> bool {
        let context = {
            let mut contexts = self.contexts.lock();
            if contexts.contains_key(&handle) {
                tracing::warn!(%handle, context_name = name, "execution is already being debugged");
                return false;
            }
            let context = Arc::new(DebugContext::new(handle, name));
            contexts.insert(handle, Arc::clone(&context));
            context
        };
        tracing::info!(%handle, context_name = name, "debugging started");
        self.bridge().context_added(&context);
        true
    }

    /// Unregister `handle`, waking its execution thread if it is paused.
    /// Unknown handles are a no-op. Always returns `true`.
    ///
    /// The entry is taken out of the map first, so of several concurrent
    /// stops only one tears the context down and announces it, and a context
    /// registered again for the same handle meanwhile is left alone.
    pub fn stop_debugging(&self, handle: ExecutionHandle) -> bool {
        let Some(context) = self.contexts.lock().remove(&handle) else {
            return true;
        };
        self.bridge().context_removed(&context);
        // A hook racing this stop still holds the context; closing it makes
        // that hook refuse to park.
        let was_paused = context.close();
        tracing::info!(%handle, was_paused, "debugging stopped");
        true
    }

    /// Look up the context for `handle`.
    pub fn context(&self, handle: ExecutionHandle) -> Option<Arc<DebugContext>> {
        self.contexts.lock().get(&handle).cloned()
    }

    /// All contexts, ordered by handle.
    pub fn contexts(&self) -> Vec<Arc<DebugContext>> {
        let mut all: Vec<_> = self.contexts.lock().values().cloned().collect();
        all.sort_by_key(|c| c.handle());
        all
    }

    /// Start debugging `handle` and install the hook in the host runtime.
    pub fn attach(&self, handle: ExecutionHandle, name: &str) -> Result<(), DebugError> {
        if !self.start_debugging(handle, name) {
            return Err(DebugError::AlreadyAttached(handle));
        }
        if let Err(e) = self.host.install_hook(handle) {
            self.stop_debugging(handle);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the hook for `handle` and stop debugging it.
    pub fn detach(&self, handle: ExecutionHandle) -> Result<(), DebugError> {
        if self.context(handle).is_none() {
            return Err(DebugError::UnknownContext(handle));
        }
        let removed = self.host.remove_hook(handle);
        self.stop_debugging(handle);
        removed.map_err(DebugError::from)
    }

    /// Called by the host runtime on the execution thread at every hook point.
    /// May block until a client resumes the context.
    pub fn on_hook_event(&self, handle: ExecutionHandle, raw: &RawHookEvent<'_>) {
        if !self.is_listening() {
            return;
        }
        let Some(context) = self.context(handle) else {
            tracing::debug!(%handle, "hook event for an execution that is not attached");
            return;
        };
        let event = BreakpointEvent::snapshot(raw);
        tracing::trace!(%handle, kind = ?event.kind, line = event.current_line, "hook event");
        dispatcher::dispatch(self, &context, event);
    }

    /// Turn hook processing on or off. While off, hook events return at once.
    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Resume every paused context. Returns how many were paused.
    pub fn resume_all(&self) -> usize {
        let _hand_off = self.remote.hold();
        self.contexts().iter().filter(|c| c.resume()).count()
    }

    /// Pass a raw client message to the remote handler.
    pub fn handle_message(&self, message: &str) {
        self.bridge().handle_message(message);
    }

    /// Pass a structured request to the remote handler and return the reply.
    pub fn handle_json(&self, request: &serde_json::Value) -> String {
        self.bridge().handle_json(request)
    }

    /// The remote operation surface bound to this registry.
    pub fn bridge(&self) -> CommandBridge<'_> {
        CommandBridge::new(self)
    }

    pub fn host(&self) -> &dyn HostRuntime {
        self.host.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn MessageSink {
        self.sink.as_ref()
    }

    pub(crate) fn remote(&self) -> &RemoteDispatch {
        &self.remote
    }

    pub(crate) fn wait_strategy(&self) -> &dyn WaitStrategy {
        self.wait.as_ref()
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        for (_, context) in self.contexts.get_mut().drain() {
            context.close();
        }
    }
}
