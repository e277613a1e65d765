//! ldb-core: debug-session coordination for an embedded scripting runtime.
//!
//! The host runtime reports hook events to a [`Debugger`], which decides
//! through the dispatcher whether to pause the reporting execution thread.
//! Clients inspect and resume paused contexts through the [`CommandBridge`],
//! driven by a pluggable [`RemoteHandler`] such as [`JsonHandler`].

pub mod bridge;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handle;
pub mod handler;
pub mod host;
pub mod registry;
pub mod script;
pub mod value;

// Re-export key types for convenience.
pub use bridge::{CommandBridge, ContextInfo, RemoteHandler, VariableSlot, FAILURE_PAYLOAD};
pub use context::{DebugContext, Indefinite, RunState, WaitStrategy};
pub use dispatcher::{classify, Escalation, IgnoreReason};
pub use error::{
    CommandError, DebugError, HandlerError, HostError, ScriptError, SerializeError, SinkError,
};
pub use event::{BreakpointEvent, FrameKind, HookKind, RawHookEvent};
pub use handle::ExecutionHandle;
pub use handler::JsonHandler;
pub use host::{HostRuntime, MessageSink, NullSink};
pub use registry::Debugger;
pub use value::{serialize, HostValue, Payload, TypeTag, ValueClass, ValueNode};
