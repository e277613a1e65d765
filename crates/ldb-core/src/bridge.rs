//! Remote operations available to a connected client.
//!
//! The [`CommandBridge`] is the fixed operation surface; the
//! [`RemoteHandler`] is the pluggable logic that turns client messages and
//! breakpoint hits into calls on that surface. Handler calls are serialized
//! across threads by a reentrant lock, so a handler may call back into the
//! bridge (and from there into itself) on the same thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde::Serialize;

use crate::context::{DebugContext, RunState};
use crate::error::{CommandError, HandlerError, SinkError};
use crate::event::BreakpointEvent;
use crate::handle::ExecutionHandle;
use crate::registry::Debugger;
use crate::value::{self, HostValue, ValueNode};

/// Pushed to the client when the remote handler fails.
pub const FAILURE_PAYLOAD: &str =
    r#"{"type":"Reply","code":-1,"value":"Unknown error in remote handler."}"#;

/// Client-facing debugger logic.
///
/// Every call receives the bridge so the handler can act on the registry.
pub trait RemoteHandler: Send + Sync {
    /// (Re)initialize handler state. Called before the first dispatch and
    /// after every failure.
    fn reload(&self, _bridge: &CommandBridge<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn context_added(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
    ) -> Result<(), HandlerError>;

    fn context_removed(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
    ) -> Result<(), HandlerError>;

    /// Decide what to do with an escalated hook event. `Ok(true)` means the
    /// handler dealt with it and execution continues; `Ok(false)` pauses.
    fn handle_breakpoint(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
        event: &BreakpointEvent,
    ) -> Result<bool, HandlerError>;

    /// Handle a raw client message.
    fn handle_message(&self, bridge: &CommandBridge<'_>, message: &str)
        -> Result<(), HandlerError>;

    /// Handle a structured request and return the reply text.
    fn handle_json(
        &self,
        bridge: &CommandBridge<'_>,
        request: &serde_json::Value,
    ) -> Result<String, HandlerError>;
}

/// Owns the handler, its dispatch lock and the reload flag.
pub(crate) struct RemoteDispatch {
    handler: Box<dyn RemoteHandler>,
    lock: ReentrantMutex<()>,
    reload_requested: AtomicBool,
}

impl RemoteDispatch {
    pub(crate) fn new(handler: Box<dyn RemoteHandler>) -> Self {
        Self {
            handler,
            lock: ReentrantMutex::new(()),
            // The handler is loaded on first use.
            reload_requested: AtomicBool::new(true),
        }
    }

    /// Hold the dispatch lock without calling the handler. Anything that
    /// must not interleave with a handler call (the pause after a breakpoint
    /// hit, a resume) runs under this guard.
    pub(crate) fn hold(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
    }

    fn call<T>(
        &self,
        bridge: &CommandBridge<'_>,
        f: impl FnOnce(&dyn RemoteHandler) -> Result<T, HandlerError>,
    ) -> Result<T, HandlerError> {
        let _guard = self.lock.lock();
        if self.reload_requested.swap(false, Ordering::SeqCst) {
            tracing::debug!("reloading remote handler");
            if let Err(e) = self.handler.reload(bridge) {
                self.request_reload();
                return Err(e);
            }
        }
        f(self.handler.as_ref())
    }
}

/// One entry of [`CommandBridge::get_contexts`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextInfo {
    pub handle: ExecutionHandle,
    pub name: String,
    pub state: RunState,
    /// `file:line` of the pause, when paused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One entry of a local or upvalue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableSlot {
    /// 1-based index, usable with `get_local`/`get_upvalue`.
    pub index: u32,
    pub name: String,
}

/// The remote operation surface over one [`Debugger`].
#[derive(Clone, Copy)]
pub struct CommandBridge<'a> {
    debugger: &'a Debugger,
}

impl<'a> CommandBridge<'a> {
    pub(crate) fn new(debugger: &'a Debugger) -> Self {
        Self { debugger }
    }

    pub fn debugger(&self) -> &'a Debugger {
        self.debugger
    }

    // -------------------------------------------------------------------------
    // Handler hand-off
    // -------------------------------------------------------------------------

    /// Tell the handler a context was registered.
    pub fn context_added(&self, context: &DebugContext) {
        let result = self.remote().call(self, |h| h.context_added(self, context));
        if let Err(e) = result {
            self.report_failure("context_added", &e);
        }
    }

    /// Tell the handler a context is going away.
    pub fn context_removed(&self, context: &DebugContext) {
        let result = self.remote().call(self, |h| h.context_removed(self, context));
        if let Err(e) = result {
            self.report_failure("context_removed", &e);
        }
    }

    /// Ask the handler whether an escalated event was handled.
    ///
    /// On failure a reload is requested and the error is returned; the caller
    /// then continues without pausing.
    pub fn handle_breakpoint(
        &self,
        context: &DebugContext,
        event: &BreakpointEvent,
    ) -> Result<bool, HandlerError> {
        self.remote()
            .call(self, |h| h.handle_breakpoint(self, context, event))
            .map_err(|e| {
                tracing::error!(handle = %context.handle(), "breakpoint handler failed: {}", e);
                self.remote().request_reload();
                e
            })
    }

    /// Pass a raw client message to the handler.
    pub fn handle_message(&self, message: &str) {
        let result = self.remote().call(self, |h| h.handle_message(self, message));
        if let Err(e) = result {
            self.report_failure("handle_message", &e);
        }
    }

    /// Pass a structured request to the handler and return its reply text,
    /// or `null` when the handler failed.
    pub fn handle_json(&self, request: &serde_json::Value) -> String {
        match self.remote().call(self, |h| h.handle_json(self, request)) {
            Ok(reply) => reply,
            Err(e) => {
                self.report_failure("handle_json", &e);
                "null".to_string()
            }
        }
    }

    fn report_failure(&self, operation: &str, err: &HandlerError) {
        tracing::error!(operation, "remote handler failed: {}", err);
        self.remote().request_reload();
        if let Err(e) = self.send(FAILURE_PAYLOAD.as_bytes()) {
            tracing::debug!("failure notice not delivered: {}", e);
        }
    }

    fn remote(&self) -> &'a RemoteDispatch {
        self.debugger.remote()
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Push raw text to the client.
    pub fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.debugger.sink().send_message(payload)
    }

    /// Resume a paused context. Resuming a running one is a no-op.
    pub fn resume(&self, handle: ExecutionHandle) -> Result<(), CommandError> {
        let context = self.lookup(handle)?;
        let _hand_off = self.remote().hold();
        context.resume();
        Ok(())
    }

    /// Reload the handler before its next dispatch.
    pub fn reload(&self) {
        self.remote().request_reload();
    }

    /// Run a script file inside a paused context.
    pub fn load_file(&self, handle: ExecutionHandle, path: &Path) -> Result<(), CommandError> {
        self.paused(handle)?;
        self.debugger.host().load_file(handle, path)?;
        Ok(())
    }

    /// Every registered context, ordered by handle.
    pub fn get_contexts(&self) -> Vec<ContextInfo> {
        self.debugger
            .contexts()
            .into_iter()
            .map(|context| ContextInfo {
                handle: context.handle(),
                name: context.name().to_string(),
                state: context.state(),
                location: context.pause_info().map(|info| info.location()),
            })
            .collect()
    }

    /// Evaluate an expression in a paused context. The result is serialized
    /// one level deep.
    pub fn evaluate_string(
        &self,
        handle: ExecutionHandle,
        expr: &str,
    ) -> Result<ValueNode, CommandError> {
        self.paused(handle)?;
        let mut result = None;
        self.debugger.host().evaluate(handle, expr, &mut |v| {
            if result.is_none() {
                result = Some(value::serialize(v, 1, None));
            }
        })?;
        match result {
            Some(node) => node.map_err(serialize_failed),
            None => Ok(ValueNode::nil()),
        }
    }

    /// Names of the locals in `frame`, by ascending index.
    pub fn get_locals(
        &self,
        handle: ExecutionHandle,
        frame: usize,
    ) -> Result<Vec<VariableSlot>, CommandError> {
        self.paused(handle)?;
        Ok(enumerate(|index, visit| {
            self.debugger.host().visit_local(handle, frame, index, visit)
        }))
    }

    /// Serialize local number `index` of `frame`.
    pub fn get_local(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        levels: i32,
    ) -> Result<ValueNode, CommandError> {
        self.paused(handle)?;
        fetch(levels, |visit| {
            self.debugger.host().visit_local(handle, frame, index, visit)
        })
    }

    /// Names of the upvalues of the function running in `frame`.
    pub fn get_upvalues(
        &self,
        handle: ExecutionHandle,
        frame: usize,
    ) -> Result<Vec<VariableSlot>, CommandError> {
        self.paused(handle)?;
        Ok(enumerate(|index, visit| {
            self.debugger.host().visit_upvalue(handle, frame, index, visit)
        }))
    }

    /// Serialize upvalue number `index` of the function running in `frame`.
    pub fn get_upvalue(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        levels: i32,
    ) -> Result<ValueNode, CommandError> {
        self.paused(handle)?;
        fetch(levels, |visit| {
            self.debugger.host().visit_upvalue(handle, frame, index, visit)
        })
    }

    pub fn set_local(
        &self,
        _handle: ExecutionHandle,
        _frame: usize,
        _index: u32,
        _value: &serde_json::Value,
    ) -> Result<(), CommandError> {
        Err(CommandError::not_implemented())
    }

    pub fn set_upvalue(
        &self,
        _handle: ExecutionHandle,
        _frame: usize,
        _index: u32,
        _value: &serde_json::Value,
    ) -> Result<(), CommandError> {
        Err(CommandError::not_implemented())
    }

    fn lookup(&self, handle: ExecutionHandle) -> Result<Arc<DebugContext>, CommandError> {
        self.debugger
            .context(handle)
            .ok_or_else(|| CommandError::invalid_context(handle))
    }

    /// Frame data may only be read while the execution thread is parked.
    fn paused(&self, handle: ExecutionHandle) -> Result<Arc<DebugContext>, CommandError> {
        let context = self.lookup(handle)?;
        if !context.is_paused() {
            return Err(CommandError::running());
        }
        Ok(context)
    }
}

type Visitor<'v> = &'v mut dyn FnMut(&str, &dyn HostValue);

fn enumerate(mut lookup: impl FnMut(u32, Visitor<'_>) -> bool) -> Vec<VariableSlot> {
    let mut slots = Vec::new();
    for index in 1.. {
        let mut name = None;
        let found = lookup(index, &mut |n, _| name = Some(n.to_string()));
        if !found {
            break;
        }
        slots.push(VariableSlot {
            index,
            name: name.unwrap_or_default(),
        });
    }
    slots
}

fn fetch(
    levels: i32,
    lookup: impl FnOnce(Visitor<'_>) -> bool,
) -> Result<ValueNode, CommandError> {
    let mut result = None;
    let found = lookup(&mut |name, v| {
        result = Some(value::serialize(v, levels, Some(name)));
    });
    match result {
        Some(node) if found => node.map_err(serialize_failed),
        _ => Err(CommandError::invalid_index()),
    }
}

fn serialize_failed(err: crate::error::SerializeError) -> CommandError {
    CommandError::new(-1, err.to_string())
}
