mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread;

use common::{wait_until, LineBreaks, TIMEOUT};
use ldb_core::script::{FunctionDef, Program, ScriptHost, ScriptValue};
use ldb_core::{
    CommandError, Debugger, ExecutionHandle, JsonHandler, MessageSink, NullSink, RunState,
    SinkError,
};
use parking_lot::Mutex;
use serde_json::json;

fn program() -> Program {
    let work = FunctionDef::new("work", 10, 20)
        .local(11, "i", ScriptValue::Number(1.0))
        .local(12, "j", ScriptValue::Number(2.0));
    Program::new("@worker.lua", FunctionDef::new("", 1, 5).call(2, "work")).function(work)
}

fn setup(lines: &[i32]) -> (Arc<Debugger>, Arc<ScriptHost>) {
    let host = Arc::new(ScriptHost::new(program()));
    let debugger = Arc::new(Debugger::new(
        host.clone(),
        LineBreaks::at(lines),
        Arc::new(NullSink),
    ));
    (debugger, host)
}

fn spawn_run(
    debugger: &Arc<Debugger>,
    host: &Arc<ScriptHost>,
    handle: ExecutionHandle,
    done: mpsc::Sender<ExecutionHandle>,
) -> thread::JoinHandle<()> {
    let debugger = Arc::clone(debugger);
    let host = Arc::clone(host);
    thread::spawn(move || {
        host.run(&debugger, handle).unwrap();
        done.send(handle).unwrap();
    })
}

#[test]
fn n_paused_contexts_resume_in_reverse_order() {
    const N: usize = 8;
    let (debugger, host) = setup(&[12]);
    let (done_tx, done_rx) = mpsc::channel();

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let handle = host.create_thread(format!("worker-{i}"));
            debugger.attach(handle, &format!("worker-{i}")).unwrap();
            handle
        })
        .collect();
    let threads: Vec<_> = handles
        .iter()
        .map(|&h| spawn_run(&debugger, &host, h, done_tx.clone()))
        .collect();

    assert!(
        wait_until(|| debugger.contexts().iter().all(|c| c.is_paused())),
        "all contexts should pause"
    );
    assert!(done_rx.try_recv().is_err());

    for &handle in handles.iter().rev() {
        debugger.bridge().resume(handle).unwrap();
        let finished = done_rx.recv_timeout(TIMEOUT).expect("resumed thread finishes");
        assert_eq!(finished, handle, "only the resumed context may continue");
    }
    for t in threads {
        t.join().unwrap();
    }
}

#[test]
fn resuming_one_context_leaves_others_paused() {
    let (debugger, host) = setup(&[11]);
    let (done_tx, done_rx) = mpsc::channel();
    let a = host.create_thread("a");
    let b = host.create_thread("b");
    debugger.attach(a, "a").unwrap();
    debugger.attach(b, "b").unwrap();
    let ta = spawn_run(&debugger, &host, a, done_tx.clone());
    let tb = spawn_run(&debugger, &host, b, done_tx);

    assert!(wait_until(|| debugger.contexts().iter().all(|c| c.is_paused())));
    debugger.bridge().resume(a).unwrap();
    assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), a);
    assert_eq!(debugger.context(b).unwrap().state(), RunState::Paused);

    debugger.bridge().resume(b).unwrap();
    assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), b);
    ta.join().unwrap();
    tb.join().unwrap();
}

#[test]
fn stop_debugging_wakes_the_paused_thread() {
    let (debugger, host) = setup(&[11]);
    let handle = host.create_thread("main");
    debugger.attach(handle, "main").unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let runner = {
        let debugger = Arc::clone(&debugger);
        let host = Arc::clone(&host);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            host.run(&debugger, handle).unwrap();
            finished.store(true, Ordering::SeqCst);
        })
    };

    assert!(wait_until(|| debugger
        .context(handle)
        .is_some_and(|c| c.is_paused())));
    assert!(!finished.load(Ordering::SeqCst));

    assert!(debugger.stop_debugging(handle));
    assert!(debugger.context(handle).is_none());
    assert!(wait_until(|| finished.load(Ordering::SeqCst)));
    runner.join().unwrap();
}

#[test]
fn resume_all_releases_every_paused_thread() {
    let (debugger, host) = setup(&[11]);
    let (done_tx, done_rx) = mpsc::channel();
    let threads: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let handle = host.create_thread(name);
            debugger.attach(handle, name).unwrap();
            spawn_run(&debugger, &host, handle, done_tx.clone())
        })
        .collect();

    assert!(wait_until(|| debugger.contexts().iter().all(|c| c.is_paused())));
    assert_eq!(debugger.resume_all(), 3);
    for _ in 0..3 {
        done_rx.recv_timeout(TIMEOUT).expect("thread finishes after resume_all");
    }
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(debugger.resume_all(), 0);
}

#[test]
fn inspection_is_rejected_while_running() {
    let (debugger, host) = setup(&[]);
    let handle = host.create_thread("main");
    debugger.attach(handle, "main").unwrap();
    let bridge = debugger.bridge();

    assert_eq!(
        bridge.evaluate_string(handle, "i").unwrap_err(),
        CommandError::running()
    );
    assert_eq!(bridge.get_locals(handle, 0).unwrap_err(), CommandError::running());
    assert_eq!(
        bridge.get_upvalue(handle, 0, 1, 1).unwrap_err(),
        CommandError::running()
    );
    assert_eq!(
        bridge.load_file(handle, std::path::Path::new("x.lua")).unwrap_err(),
        CommandError::running()
    );

    let unknown = ExecutionHandle::new(0xdead);
    assert_eq!(
        bridge.get_locals(unknown, 0).unwrap_err(),
        CommandError::invalid_context(unknown)
    );
}

#[test]
fn hooks_are_ignored_while_not_listening() {
    let (debugger, host) = setup(&[11]);
    let handle = host.create_thread("main");
    debugger.attach(handle, "main").unwrap();
    debugger.set_listening(false);

    // Would pause at line 11 if hooks were processed.
    host.run(&debugger, handle).unwrap();
    assert!(!debugger.context(handle).unwrap().is_paused());
}

/// Calls `resume_all` from another thread the moment a pause is announced,
/// the way a client that drops right after the notice does.
struct ResumeOnPause {
    debugger: Mutex<Weak<Debugger>>,
    resumed: Mutex<mpsc::Sender<usize>>,
}

impl MessageSink for ResumeOnPause {
    fn send_message(&self, payload: &[u8]) -> Result<(), SinkError> {
        if !String::from_utf8_lossy(payload).contains("\"ContextPaused\"") {
            return Ok(());
        }
        let debugger = self.debugger.lock().clone();
        let resumed = self.resumed.lock().clone();
        thread::spawn(move || {
            if let Some(debugger) = debugger.upgrade() {
                resumed.send(debugger.resume_all()).ok();
            }
        });
        Ok(())
    }
}

#[test]
fn resume_racing_the_pause_notice_is_not_lost() {
    let (resumed_tx, resumed_rx) = mpsc::channel();
    let sink = Arc::new(ResumeOnPause {
        debugger: Mutex::new(Weak::new()),
        resumed: Mutex::new(resumed_tx),
    });
    let host = Arc::new(ScriptHost::new(program()));
    let debugger = Arc::new(Debugger::new(
        host.clone(),
        Box::new(JsonHandler::new()),
        sink.clone(),
    ));
    *sink.debugger.lock() = Arc::downgrade(&debugger);

    let reply = debugger.handle_json(&json!({
        "cmd": "break",
        "data": {"filename": "worker.lua", "linenum": 12}
    }));
    let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["code"], 0, "{reply}");

    let handle = host.create_thread("main");
    debugger.attach(handle, "main").unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    for _ in 0..20 {
        let runner = spawn_run(&debugger, &host, handle, done_tx.clone());
        let resumed = resumed_rx.recv_timeout(TIMEOUT).expect("pause was announced");
        assert_eq!(resumed, 1, "the announced context must already be paused");
        done_rx
            .recv_timeout(TIMEOUT)
            .expect("resume issued on the notice releases the thread");
        runner.join().unwrap();
    }
}
