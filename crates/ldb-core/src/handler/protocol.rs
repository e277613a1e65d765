//! Client protocol message types.
//!
//! Requests are `{"id": n, "cmd": "...", "data": {...}}`. Every request gets a
//! `Reply` carrying the request back as `original`; state changes are pushed
//! as `Event`s.

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::event::BreakpointEvent;
use crate::handle::ExecutionHandle;

use super::breakpoints::Breakpoint;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Client-chosen correlation id, echoed through `original`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Command name.
    pub cmd: String,
    /// Command arguments.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Always "Reply".
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// 0 on success.
    pub code: i32,
    /// Result on success, error text otherwise.
    pub value: serde_json::Value,
    /// The request this answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<serde_json::Value>,
}

impl Reply {
    pub fn ok(value: serde_json::Value, original: Option<serde_json::Value>) -> Self {
        Self {
            message_type: "Reply",
            code: 0,
            value,
            original,
        }
    }

    pub fn error(err: CommandError, original: Option<serde_json::Value>) -> Self {
        Self {
            message_type: "Reply",
            code: err.code,
            value: serde_json::Value::String(err.message),
            original,
        }
    }
}

/// An unsolicited notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<T> {
    /// Always "Event".
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// `ContextAdded`, `ContextRemoved` or `ContextPaused`.
    pub event: &'static str,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(event: &'static str, data: T) -> Self {
        Self {
            message_type: "Event",
            event,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Event bodies
// ---------------------------------------------------------------------------

/// Body of `ContextAdded` / `ContextRemoved`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBody<'a> {
    pub context: ExecutionHandle,
    pub name: &'a str,
}

/// Body of `ContextPaused`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PausedBody<'a> {
    pub context: ExecutionHandle,
    pub name: &'a str,
    pub breakpoint: &'a Breakpoint,
    pub location: String,
    pub event: &'a BreakpointEvent,
}

// ---------------------------------------------------------------------------
// Request arguments
// ---------------------------------------------------------------------------

fn first() -> u32 {
    1
}

fn one_level() -> i32 {
    1
}

/// Arguments naming only a context (`continue`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextArgs {
    pub context: ExecutionHandle,
}

/// Arguments for `eval`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalArgs {
    pub context: ExecutionHandle,
    pub expr_str: String,
}

/// Arguments for `locals` / `upvalues`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameArgs {
    pub context: ExecutionHandle,
    #[serde(default)]
    pub frame: usize,
}

/// Arguments for `local` / `upvalue`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableArgs {
    pub context: ExecutionHandle,
    /// 1-based variable index (`lv` for locals, `uv` for upvalues).
    #[serde(rename = "lv", alias = "uv", default = "first")]
    pub index: u32,
    /// Serialization depth.
    #[serde(default = "one_level")]
    pub nlevels: i32,
    #[serde(default)]
    pub frame: usize,
}

/// Arguments for `setlocal` / `setupvalue`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetVariableArgs {
    pub context: ExecutionHandle,
    #[serde(rename = "lv", alias = "uv", default = "first")]
    pub index: u32,
    #[serde(default)]
    pub frame: usize,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Arguments for `load`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoadArgs {
    pub context: ExecutionHandle,
    pub file: std::path::PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_data_or_id() {
        let req: Request = serde_json::from_str(r#"{"cmd":"contexts"}"#).unwrap();
        assert_eq!(req.cmd, "contexts");
        assert!(req.id.is_none());
        assert!(req.data.is_null());
    }

    #[test]
    fn reply_shape() {
        let original = json!({"id": 3, "cmd": "contexts"});
        let reply = Reply::ok(json!([]), Some(original.clone()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            json!({"type": "Reply", "code": 0, "value": [], "original": original})
        );
    }

    #[test]
    fn error_reply_carries_message() {
        let reply = Reply::error(CommandError::running(), None);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["code"], -1);
        assert_eq!(json["value"], "Stack is currently running.");
        assert!(json.get("original").is_none());
    }

    #[test]
    fn event_shape() {
        let event = Event::new(
            "ContextAdded",
            ContextBody {
                context: ExecutionHandle::new(0x1f),
                name: "main",
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"type": "Event", "event": "ContextAdded", "data": {"context": "0x1f", "name": "main"}})
        );
    }

    #[test]
    fn variable_args_defaults() {
        let args: VariableArgs = serde_json::from_value(json!({"context": "0x1"})).unwrap();
        assert_eq!(args.index, 1);
        assert_eq!(args.nlevels, 1);
        assert_eq!(args.frame, 0);
    }

    #[test]
    fn variable_args_accept_upvalue_index() {
        let args: VariableArgs =
            serde_json::from_value(json!({"context": 1, "uv": 3, "nlevels": 2, "frame": 1}))
                .unwrap();
        assert_eq!(args.index, 3);
        assert_eq!(args.nlevels, 2);
        assert_eq!(args.frame, 1);
    }
}
