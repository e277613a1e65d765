mod demo;
mod server;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use ldb_config::{load_config, load_from_path, Config, LogConfig};
use ldb_core::script::{Program, ScriptHost};
use ldb_core::{Debugger, JsonHandler};

use crate::demo::DemoThreads;
use crate::server::{ClientSlot, ServeOptions};

/// Load the config named on the command line, or the per-user one.
///
/// A broken per-user config falls back to defaults; an explicitly named file
/// must load.
fn load_configuration(explicit: Option<PathBuf>) -> Result<(Config, Option<String>)> {
    if let Some(path) = explicit {
        let config = load_from_path(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        return Ok((config, None));
    }
    let Some(dir) = ldb_config::paths::default_config_dir() else {
        return Ok((Config::default(), Some("no home directory".to_string())));
    };
    match load_config(&dir) {
        Ok(config) => Ok((config, None)),
        Err(e) => Ok((Config::default(), Some(e.to_string()))),
    }
}

fn init_logging(log: &LogConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log.level.as_str()));

    // Log to a file unless there is nowhere to put one.
    let file = log.file.clone().or_else(ldb_config::paths::default_log_file);
    match &file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(env_filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .init();
        }
    }
    Ok(())
}

fn run_server(config_path: Option<PathBuf>) -> Result<()> {
    // Configuration first so logging can honour it.
    let (config, fallback) = load_configuration(config_path)?;
    init_logging(&config.log)?;
    if let Some(reason) = fallback {
        warn!("config load failed, using defaults: {}", reason);
    }
    info!(level = config.log.level.as_str(), "ldb-server starting");

    let step_delay = Duration::from_millis(config.demo.step_delay_ms);
    let host = Arc::new(
        ScriptHost::new(Program::demo(&config.demo.script_name)).with_step_delay(step_delay),
    );
    let slot = Arc::new(ClientSlot::new());
    let debugger = Arc::new(Debugger::new(
        host.clone(),
        Box::new(JsonHandler::new()),
        slot.clone(),
    ));
    debugger.set_listening(config.debugger.break_without_client);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let address = config.server.address();
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind(&address))
        .with_context(|| format!("failed to listen on {address}"))?;
    info!(%address, "waiting for a debug client");

    let demo = DemoThreads::spawn(&host, &debugger, config.demo.threads, step_delay)?;

    let options = ServeOptions {
        break_without_client: config.debugger.break_without_client,
    };
    runtime.block_on(server::serve(
        listener,
        Arc::clone(&debugger),
        Arc::clone(&slot),
        options,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        },
    ));

    // Nothing may pause once the client is gone.
    debugger.set_listening(false);
    demo.shutdown(&debugger);
    info!("ldb-server exited cleanly");
    Ok(())
}

fn main() {
    let config_path = env::args().nth(1).map(PathBuf::from);

    if let Err(e) = run_server(config_path) {
        eprintln!("ldb-server: {:#}", e);
        std::process::exit(1);
    }
}
