//! The default remote handler: a JSON command protocol with file/line and
//! function breakpoints.

pub mod breakpoints;
pub mod protocol;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::{CommandBridge, RemoteHandler};
use crate::context::DebugContext;
use crate::error::{CommandError, HandlerError, SinkError};
use crate::event::BreakpointEvent;

use self::breakpoints::{Breakpoint, BreakpointTable};
use self::protocol::{
    ContextArgs, ContextBody, EvalArgs, Event, FrameArgs, LoadArgs, PausedBody, Reply, Request,
    SetVariableArgs, VariableArgs,
};

/// Speaks the JSON protocol described in [`protocol`].
#[derive(Debug, Default)]
pub struct JsonHandler {
    breakpoints: Mutex<BreakpointTable>,
}

impl JsonHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current breakpoints.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.lock().all()
    }

    /// Answer one already-parsed request.
    fn reply(&self, bridge: &CommandBridge<'_>, raw: &Value) -> Reply {
        let request = match Request::deserialize(raw) {
            Ok(request) => request,
            Err(e) => {
                let err = CommandError::new(-1, format!("Malformed request: {e}"));
                return Reply::error(err, Some(raw.clone()));
            }
        };
        tracing::debug!(cmd = %request.cmd, "client request");
        match self.execute(bridge, &request) {
            Ok(value) => Reply::ok(value, Some(raw.clone())),
            Err(err) => {
                tracing::debug!(cmd = %request.cmd, code = err.code, "request failed: {}", err.message);
                Reply::error(err, Some(raw.clone()))
            }
        }
    }

    fn execute(&self, bridge: &CommandBridge<'_>, request: &Request) -> Result<Value, CommandError> {
        match request.cmd.as_str() {
            "contexts" => encode(bridge.get_contexts()),
            "continue" => {
                let args: ContextArgs = parse_args(request)?;
                bridge.resume(args.context)?;
                Ok(Value::Null)
            }
            "eval" => {
                let args: EvalArgs = parse_args(request)?;
                encode(bridge.evaluate_string(args.context, &args.expr_str)?)
            }
            "locals" => {
                let args: FrameArgs = parse_args(request)?;
                encode(bridge.get_locals(args.context, args.frame)?)
            }
            "local" => {
                let a: VariableArgs = parse_args(request)?;
                encode(bridge.get_local(a.context, a.frame, a.index, a.nlevels)?)
            }
            "upvalues" => {
                let args: FrameArgs = parse_args(request)?;
                encode(bridge.get_upvalues(args.context, args.frame)?)
            }
            "upvalue" => {
                let a: VariableArgs = parse_args(request)?;
                encode(bridge.get_upvalue(a.context, a.frame, a.index, a.nlevels)?)
            }
            "setlocal" => {
                let a: SetVariableArgs = parse_args(request)?;
                bridge.set_local(a.context, a.frame, a.index, &a.value)?;
                Ok(Value::Null)
            }
            "setupvalue" => {
                let a: SetVariableArgs = parse_args(request)?;
                bridge.set_upvalue(a.context, a.frame, a.index, &a.value)?;
                Ok(Value::Null)
            }
            "break" => {
                let bp: Breakpoint = parse_args(request)?;
                let added = self.breakpoints.lock().add(bp.clone());
                tracing::info!(?bp, added, "breakpoint set");
                encode(bp)
            }
            "clear" => {
                let bp: Breakpoint = parse_args(request)?;
                if !self.breakpoints.lock().remove(&bp) {
                    return Err(CommandError::new(-1, "No such breakpoint."));
                }
                tracing::info!(?bp, "breakpoint cleared");
                encode(bp)
            }
            "clearall" => {
                self.breakpoints.lock().clear();
                Ok(Value::Null)
            }
            "breakpoints" => encode(self.breakpoints()),
            "load" => {
                let args: LoadArgs = parse_args(request)?;
                bridge.load_file(args.context, &args.file)?;
                Ok(Value::Null)
            }
            "reload" => {
                bridge.reload();
                Ok(Value::Null)
            }
            other => Err(CommandError::new(-1, format!("Unknown command: {other}"))),
        }
    }
}

impl RemoteHandler for JsonHandler {
    fn context_added(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
    ) -> Result<(), HandlerError> {
        let body = ContextBody {
            context: context.handle(),
            name: context.name(),
        };
        push(bridge, &Event::new("ContextAdded", body))
    }

    fn context_removed(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
    ) -> Result<(), HandlerError> {
        let body = ContextBody {
            context: context.handle(),
            name: context.name(),
        };
        push(bridge, &Event::new("ContextRemoved", body))
    }

    fn handle_breakpoint(
        &self,
        bridge: &CommandBridge<'_>,
        context: &DebugContext,
        event: &BreakpointEvent,
    ) -> Result<bool, HandlerError> {
        let Some(breakpoint) = self.breakpoints.lock().matching(event) else {
            return Ok(true);
        };
        tracing::info!(handle = %context.handle(), location = %event.location(), "breakpoint hit");
        let body = PausedBody {
            context: context.handle(),
            name: context.name(),
            breakpoint: &breakpoint,
            location: event.location(),
            event,
        };
        push(bridge, &Event::new("ContextPaused", body))?;
        Ok(false)
    }

    fn handle_message(&self, bridge: &CommandBridge<'_>, message: &str) -> Result<(), HandlerError> {
        let reply = match serde_json::from_str::<Value>(message) {
            Ok(raw) => self.reply(bridge, &raw),
            Err(e) => Reply::error(CommandError::new(-1, format!("Malformed request: {e}")), None),
        };
        push(bridge, &reply)
    }

    fn handle_json(&self, bridge: &CommandBridge<'_>, request: &Value) -> Result<String, HandlerError> {
        Ok(serde_json::to_string(&self.reply(bridge, request))?)
    }
}

/// Send a message to the client. Having no client is not an error.
fn push<T: Serialize>(bridge: &CommandBridge<'_>, message: &T) -> Result<(), HandlerError> {
    let text = serde_json::to_string(message)?;
    match bridge.send(text.as_bytes()) {
        Ok(()) => Ok(()),
        Err(SinkError::NotConnected) => {
            tracing::debug!("no client for outgoing message");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_args<T: DeserializeOwned>(request: &Request) -> Result<T, CommandError> {
    T::deserialize(&request.data).map_err(|e| {
        CommandError::new(-1, format!("Invalid arguments for {}: {}", request.cmd, e))
    })
}

fn encode<T: Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::new(-1, e.to_string()))
}
