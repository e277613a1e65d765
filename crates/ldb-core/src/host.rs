//! Collaborators supplied by the embedding environment.

use std::path::Path;

use crate::error::{HostError, ScriptError, SinkError};
use crate::handle::ExecutionHandle;
use crate::value::HostValue;

/// The scripting runtime as seen by the debugger.
///
/// Variable access and evaluation are only called while the owning context
/// is paused, so the runtime is not executing on that handle at the time.
pub trait HostRuntime: Send + Sync {
    /// Register the debugger's hook callback for `handle`.
    fn install_hook(&self, handle: ExecutionHandle) -> Result<(), HostError>;

    /// Unregister the hook callback for `handle`.
    fn remove_hook(&self, handle: ExecutionHandle) -> Result<(), HostError>;

    /// Look up local number `index` (1-based) in `frame` (0 is the innermost)
    /// and pass its name and value to `visit`. Returns `false` when there is no
    /// such local.
    fn visit_local(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        visit: &mut dyn FnMut(&str, &dyn HostValue),
    ) -> bool;

    /// Same as [`visit_local`](Self::visit_local) for the upvalues of the
    /// function running in `frame`.
    fn visit_upvalue(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        visit: &mut dyn FnMut(&str, &dyn HostValue),
    ) -> bool;

    /// Evaluate `expr` in the environment of the paused context and pass the
    /// first result to `visit`. An expression without results never calls it.
    fn evaluate(
        &self,
        handle: ExecutionHandle,
        expr: &str,
        visit: &mut dyn FnMut(&dyn HostValue),
    ) -> Result<(), ScriptError>;

    /// Load and run a script file in the context.
    fn load_file(&self, handle: ExecutionHandle, path: &Path) -> Result<(), ScriptError>;
}

/// Outward push channel to the connected client.
pub trait MessageSink: Send + Sync {
    fn send_message(&self, payload: &[u8]) -> Result<(), SinkError>;
}

/// A sink with nobody on the other end.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn send_message(&self, _payload: &[u8]) -> Result<(), SinkError> {
        Err(SinkError::NotConnected)
    }
}
