#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use ldb_core::{
    BreakpointEvent, CommandBridge, DebugContext, HandlerError, HookKind, MessageSink,
    RemoteHandler, SinkError,
};
use parking_lot::Mutex;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Records every outgoing message on a channel.
pub struct CaptureSink {
    tx: Mutex<Sender<String>>,
}

impl CaptureSink {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl MessageSink for CaptureSink {
    fn send_message(&self, payload: &[u8]) -> Result<(), SinkError> {
        let text = String::from_utf8_lossy(payload).into_owned();
        self.tx
            .lock()
            .send(text)
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

/// Pauses on the given lines, lets everything else through.
pub struct LineBreaks(pub BTreeSet<i32>);

impl LineBreaks {
    pub fn at(lines: &[i32]) -> Box<Self> {
        Box::new(Self(lines.iter().copied().collect()))
    }
}

impl RemoteHandler for LineBreaks {
    fn context_added(&self, _: &CommandBridge<'_>, _: &DebugContext) -> Result<(), HandlerError> {
        Ok(())
    }

    fn context_removed(&self, _: &CommandBridge<'_>, _: &DebugContext) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle_breakpoint(
        &self,
        _: &CommandBridge<'_>,
        _: &DebugContext,
        event: &BreakpointEvent,
    ) -> Result<bool, HandlerError> {
        Ok(!(event.kind == HookKind::Line && self.0.contains(&event.current_line)))
    }

    fn handle_message(&self, _: &CommandBridge<'_>, _: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle_json(
        &self,
        _: &CommandBridge<'_>,
        _: &serde_json::Value,
    ) -> Result<String, HandlerError> {
        Ok("null".into())
    }
}

/// Poll `cond` until it holds or the timeout passes.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Read captured messages until one satisfies `pred`.
pub fn next_matching(
    rx: &Receiver<String>,
    mut pred: impl FnMut(&serde_json::Value) -> bool,
) -> serde_json::Value {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let text = rx.recv_timeout(left).expect("timed out waiting for message");
        let value: serde_json::Value = serde_json::from_str(&text).expect("message is JSON");
        if pred(&value) {
            return value;
        }
    }
}
