//! Execution threads running the demo script under the debugger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use ldb_core::script::ScriptHost;
use ldb_core::{Debugger, ExecutionHandle};
use tracing::{error, info};

/// Pause between two runs of the script on one thread.
const MIN_RUN_INTERVAL: Duration = Duration::from_millis(10);

/// Running demo threads; stopped and joined by [`DemoThreads::shutdown`].
pub(crate) struct DemoThreads {
    running: Arc<AtomicBool>,
    workers: Vec<(ExecutionHandle, JoinHandle<()>)>,
}

impl DemoThreads {
    /// Create `count` execution threads, attach each to `debugger`, and start
    /// them looping over the script.
    pub(crate) fn spawn(
        host: &Arc<ScriptHost>,
        debugger: &Arc<Debugger>,
        count: usize,
        interval: Duration,
    ) -> Result<Self> {
        let mut threads = Self {
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::with_capacity(count),
        };
        let interval = interval.max(MIN_RUN_INTERVAL);

        for i in 0..count {
            // Threads already running would otherwise outlive the error.
            if let Err(e) = threads.start(host, debugger, format!("demo-{i}"), interval) {
                threads.shutdown(debugger);
                return Err(e);
            }
        }
        Ok(threads)
    }

    fn start(
        &mut self,
        host: &Arc<ScriptHost>,
        debugger: &Arc<Debugger>,
        name: String,
        interval: Duration,
    ) -> Result<()> {
        let handle = host.create_thread(name.as_str());
        debugger
            .attach(handle, &name)
            .with_context(|| format!("failed to attach {name}"))?;

        let worker = {
            let host = Arc::clone(host);
            let debugger = Arc::clone(debugger);
            let running = Arc::clone(&self.running);
            thread::Builder::new().name(name.clone()).spawn(move || {
                while running.load(Ordering::SeqCst) {
                    if let Err(e) = host.run(&debugger, handle) {
                        error!(%handle, "demo thread stopped: {}", e);
                        break;
                    }
                    thread::sleep(interval);
                }
            })
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                debugger.detach(handle).ok();
                return Err(e).with_context(|| format!("failed to spawn {name}"));
            }
        };
        info!(%handle, thread = %name, "demo thread started");
        self.workers.push((handle, worker));
        Ok(())
    }

    /// Stop every thread: detach it (waking it if paused) and join it.
    pub(crate) fn shutdown(self, debugger: &Debugger) {
        self.running.store(false, Ordering::SeqCst);
        for (handle, worker) in self.workers {
            if let Err(e) = debugger.detach(handle) {
                error!(%handle, "detach failed: {}", e);
            }
            if worker.join().is_err() {
                error!(%handle, "demo thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldb_core::script::Program;
    use ldb_core::{JsonHandler, NullSink};

    fn setup() -> (Arc<ScriptHost>, Arc<Debugger>) {
        let host = Arc::new(ScriptHost::new(Program::demo("demo.lua")));
        let debugger = Arc::new(Debugger::new(
            host.clone(),
            Box::new(JsonHandler::new()),
            Arc::new(NullSink),
        ));
        (host, debugger)
    }

    #[test]
    fn spawn_and_shutdown_detach_every_thread() {
        let (host, debugger) = setup();
        let threads = DemoThreads::spawn(&host, &debugger, 3, MIN_RUN_INTERVAL).unwrap();
        assert_eq!(debugger.contexts().len(), 3);
        threads.shutdown(&debugger);
        assert!(debugger.contexts().is_empty());
    }

    #[test]
    fn failed_spawn_stops_threads_already_started() {
        let (host, debugger) = setup();
        // Handles are handed out in steps of 0x10; occupy the one the second
        // demo thread will get.
        let before = host.create_thread("unused");
        let first = ExecutionHandle::new(before.raw() + 0x10);
        let second = ExecutionHandle::new(before.raw() + 0x20);
        assert!(debugger.start_debugging(second, "taken"));

        let err = DemoThreads::spawn(&host, &debugger, 3, MIN_RUN_INTERVAL)
            .err()
            .expect("attaching an occupied handle fails");
        assert!(format!("{err:#}").contains("demo-1"), "{err:#}");

        assert!(debugger.context(first).is_none());
        let contexts = debugger.contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name(), "taken");
    }
}
