mod common;

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use common::{next_matching, wait_until, CaptureSink};
use ldb_core::script::{FunctionDef, Program, ScriptHost, ScriptValue};
use ldb_core::{Debugger, ExecutionHandle, JsonHandler};
use serde_json::{json, Value};

struct Session {
    debugger: Arc<Debugger>,
    host: Arc<ScriptHost>,
    rx: Receiver<String>,
    handle: ExecutionHandle,
}

impl Session {
    fn new(program: Program) -> Self {
        let host = Arc::new(ScriptHost::new(program));
        let (sink, rx) = CaptureSink::new();
        let debugger = Arc::new(Debugger::new(
            host.clone(),
            Box::new(JsonHandler::new()),
            Arc::new(sink),
        ));
        let handle = host.create_thread("main");
        debugger.attach(handle, "main").unwrap();
        let added = next_matching(&rx, |m| m["event"] == "ContextAdded");
        assert_eq!(added["data"]["name"], "main");
        Self {
            debugger,
            host,
            rx,
            handle,
        }
    }

    fn demo() -> Self {
        Self::new(Program::demo("demo.lua"))
    }

    /// Send a request and wait for its reply.
    fn request(&self, id: u64, cmd: &str, data: Value) -> Value {
        let request = json!({"id": id, "cmd": cmd, "data": data});
        self.debugger.handle_message(&request.to_string());
        next_matching(&self.rx, |m| m["type"] == "Reply" && m["original"]["id"] == id)
    }

    fn context(&self) -> String {
        self.handle.to_string()
    }

    fn run_in_background(&self) -> thread::JoinHandle<()> {
        let debugger = Arc::clone(&self.debugger);
        let host = Arc::clone(&self.host);
        let handle = self.handle;
        thread::spawn(move || host.run(&debugger, handle).unwrap())
    }

    /// The paused event goes out just before the context parks.
    fn wait_paused(&self) -> Value {
        let event = next_matching(&self.rx, |m| m["event"] == "ContextPaused");
        assert!(wait_until(|| self
            .debugger
            .context(self.handle)
            .is_some_and(|c| c.is_paused())));
        event
    }
}

#[test]
fn line_breakpoint_pause_inspect_continue() {
    let s = Session::demo();
    let reply = s.request(1, "break", json!({"filename": "demo.lua", "linenum": 24}));
    assert_eq!(reply["code"], 0);

    let runner = s.run_in_background();
    let paused = s.wait_paused();
    assert_eq!(paused["data"]["context"], s.context());
    assert_eq!(paused["data"]["location"], "demo.lua:24");

    let ctx = s.context();

    let contexts = s.request(2, "contexts", Value::Null);
    assert_eq!(contexts["value"][0]["state"], "Paused");
    assert_eq!(contexts["value"][0]["location"], "demo.lua:24");

    // Line hooks fire before the statement runs: only `x` exists yet.
    let locals = s.request(3, "locals", json!({"context": ctx}));
    assert_eq!(locals["value"], json!([{"index": 1, "name": "x"}]));

    let x = s.request(4, "local", json!({"context": ctx, "lv": 1}));
    assert_eq!(x["value"]["name"], "x");
    assert_eq!(x["value"]["type"], "number");
    assert_eq!(x["value"]["value"], 1.0);

    let missing = s.request(5, "local", json!({"context": ctx, "lv": 2}));
    assert_eq!(missing["code"], -1);

    let upvalues = s.request(6, "upvalues", json!({"context": ctx}));
    assert_eq!(upvalues["value"], json!([{"index": 1, "name": "gravity"}]));

    // Frame 1 is `update`, suspended in its call to `step`.
    let outer = s.request(7, "locals", json!({"context": ctx, "frame": 1}));
    assert_eq!(
        outer["value"],
        json!([{"index": 1, "name": "dt"}, {"index": 2, "name": "label"}])
    );
    let config = s.request(
        8,
        "upvalue",
        json!({"context": ctx, "uv": 1, "nlevels": 1, "frame": 1}),
    );
    let entries = config["value"]["value"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["key"]["value"], "title");
    assert_eq!(entries[0]["value"]["value"], "demo");
    assert_eq!(entries[2]["value"]["raw"], true);

    let eval = s.request(9, "eval", json!({"context": ctx, "expr_str": "gravity"}));
    assert_eq!(eval["value"]["value"], -9.8);

    let stub = s.request(10, "setlocal", json!({"context": ctx, "lv": 1, "value": 5}));
    assert_eq!(stub["code"], -2);
    assert_eq!(stub["value"], "Not yet implemented.");

    let resumed = s.request(11, "continue", json!({"context": ctx}));
    assert_eq!(resumed["code"], 0);
    runner.join().unwrap();

    let running = s.request(12, "eval", json!({"context": ctx, "expr_str": "x"}));
    assert_eq!(running["code"], -1);
    assert_eq!(running["value"], "Stack is currently running.");
}

#[test]
fn function_breakpoint_pauses_on_call() {
    let s = Session::demo();
    s.request(1, "break", json!({"funcname": "update"}));
    let runner = s.run_in_background();

    let paused = s.wait_paused();
    assert_eq!(paused["data"]["breakpoint"], json!({"funcname": "update"}));
    assert_eq!(paused["data"]["event"]["kind"], "call");
    assert_eq!(paused["data"]["location"], "demo.lua:10");

    s.request(2, "continue", json!({"context": s.context()}));
    runner.join().unwrap();
}

#[test]
fn string_chunks_never_hit_line_breakpoints() {
    let main = FunctionDef::new("", 1, 3).call(1, "f");
    let f = FunctionDef::new("f", 1, 3).local(2, "a", ScriptValue::Number(1.0));
    let s = Session::new(Program::new("local a = 1", main).function(f));
    s.request(1, "break", json!({"filename": "local a = 1", "linenum": 2}));

    // Runs to completion on this thread without pausing.
    s.host.run(&s.debugger, s.handle).unwrap();
    assert!(!s.debugger.context(s.handle).unwrap().is_paused());
}

#[test]
fn breakpoint_bookkeeping() {
    let s = Session::demo();
    s.request(1, "break", json!({"filename": "demo.lua", "linenum": 12}));
    s.request(2, "break", json!({"funcname": "step"}));

    let list = s.request(3, "breakpoints", Value::Null);
    assert_eq!(
        list["value"],
        json!([{"filename": "demo.lua", "linenum": 12}, {"funcname": "step"}])
    );

    let cleared = s.request(4, "clear", json!({"funcname": "step"}));
    assert_eq!(cleared["code"], 0);
    let again = s.request(5, "clear", json!({"funcname": "step"}));
    assert_eq!(again["code"], -1);

    s.request(6, "clearall", Value::Null);
    let list = s.request(7, "breakpoints", Value::Null);
    assert_eq!(list["value"], json!([]));

    let bad = s.request(8, "break", json!({"linenum": 3}));
    assert_eq!(bad["code"], -1);
}

#[test]
fn load_file_while_paused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patch.lua");
    std::fs::write(&path, "speed = 10\n").unwrap();

    let s = Session::demo();
    let ctx = s.context();
    let rejected = s.request(1, "load", json!({"context": ctx, "file": path}));
    assert_eq!(rejected["code"], -1);

    s.request(2, "break", json!({"filename": "demo.lua", "linenum": 11}));
    let runner = s.run_in_background();
    s.wait_paused();

    let loaded = s.request(3, "load", json!({"context": ctx, "file": path}));
    assert_eq!(loaded["code"], 0);
    let speed = s.request(4, "eval", json!({"context": ctx, "expr_str": "speed"}));
    assert_eq!(speed["value"]["value"], 10.0);

    let missing = s.request(
        5,
        "load",
        json!({"context": ctx, "file": dir.path().join("missing.lua")}),
    );
    assert_ne!(missing["code"], 0);

    s.request(6, "continue", json!({"context": ctx}));
    runner.join().unwrap();
}

#[test]
fn protocol_errors_are_replies() {
    let s = Session::demo();

    let unknown = s.request(1, "explode", Value::Null);
    assert_eq!(unknown["code"], -1);
    assert_eq!(unknown["value"], "Unknown command: explode");

    let invalid = s.request(2, "continue", json!({"context": "0xnope"}));
    assert_eq!(invalid["code"], -1);

    let no_context = s.request(3, "continue", json!({"context": "0x1"}));
    assert_eq!(no_context["value"], "Invalid context: 0x1.");

    s.debugger.handle_message("{not json");
    let malformed = next_matching(&s.rx, |m| m["type"] == "Reply");
    assert_eq!(malformed["code"], -1);
    assert!(malformed.get("original").is_none());
}

#[test]
fn handle_json_returns_the_reply_text() {
    let s = Session::demo();
    let text = s.debugger.handle_json(&json!({"id": 1, "cmd": "contexts"}));
    let reply: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(reply["type"], "Reply");
    assert_eq!(reply["value"][0]["name"], "main");
    assert_eq!(reply["value"][0]["state"], "Running");
}

#[test]
fn detach_announces_removal() {
    let s = Session::demo();
    s.debugger.detach(s.handle).unwrap();
    let removed = next_matching(&s.rx, |m| m["event"] == "ContextRemoved");
    assert_eq!(removed["data"]["context"], s.context());
    assert!(wait_until(|| s.debugger.contexts().is_empty()));
}
