//! Debugger error types.

use serde::Serialize;
use thiserror::Error;

use crate::handle::ExecutionHandle;

/// Errors from registry and state-machine operations.
#[derive(Debug, Error)]
pub enum DebugError {
    /// `attach`/`start_debugging` on a handle that already has a context.
    #[error("execution {0} is already being debugged")]
    AlreadyAttached(ExecutionHandle),

    /// The handle has no registered context.
    #[error("no debug context for execution {0}")]
    UnknownContext(ExecutionHandle),

    /// `pause` on a context that is already paused. This is a contract
    /// violation by the caller.
    #[error("execution {0} is already paused")]
    AlreadyPaused(ExecutionHandle),

    /// The host runtime rejected a hook operation.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A value could not be serialized.
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// Errors reported by the host runtime collaborator.
#[derive(Debug, Error)]
pub enum HostError {
    /// The runtime does not know the handle.
    #[error("host runtime has no execution {0}")]
    UnknownExecution(ExecutionHandle),

    /// Installing or removing the hook callback failed.
    #[error("hook registration failed: {0}")]
    Hook(String),
}

/// An error raised by the host runtime while evaluating or loading script
/// code, with the runtime's own status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    /// Runtime status code (non-zero).
    pub code: i32,
    /// Runtime error text.
    pub message: String,
}

impl ScriptError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ScriptError> for CommandError {
    fn from(err: ScriptError) -> Self {
        CommandError::new(err.code, err.message)
    }
}

/// Errors from the value serializer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// A negative recursion depth was requested.
    #[error("serialization depth must not be negative, got {0}")]
    NegativeDepth(i32),
}

/// A failure inside the remote handler logic.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not (re)initialize its state.
    #[error("handler reload failed: {0}")]
    Reload(String),

    /// The handler failed while processing a call.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler could not encode its output.
    #[error("handler output encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Pushing a message to the client failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Errors from the outward message sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// No client is connected to receive the message.
    #[error("no client connected")]
    NotConnected,

    /// The transport failed while sending.
    #[error("send failed: {0}")]
    Transport(String),
}

/// Client-visible failure of a bridge command: a non-zero code plus a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message} (code {code})")]
pub struct CommandError {
    /// Non-zero status code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl CommandError {
    /// Create a command error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Inspection attempted while the context's thread is executing.
    pub fn running() -> Self {
        Self::new(-1, "Stack is currently running.")
    }

    /// The handle names no registered context.
    pub fn invalid_context(handle: ExecutionHandle) -> Self {
        Self::new(-1, format!("Invalid context: {handle}."))
    }

    /// A local or upvalue index past the last entry.
    pub fn invalid_index() -> Self {
        Self::new(-1, "Invalid variable index.")
    }

    /// Placeholder operations.
    pub fn not_implemented() -> Self {
        Self::new(-2, "Not yet implemented.")
    }
}
