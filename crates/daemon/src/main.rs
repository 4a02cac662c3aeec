// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `jobmeshd`: a thin binary that wires the four library crates together.
//!
//! `jobmeshd record <runner.json> <recorder.json>` starts a [`JobRunner`],
//! a [`Recorder`], and a demo publisher, and records until signaled.
//! `jobmeshd replay <record_dir> [speed_up_rate]` starts a [`JobRunner`]
//! and a [`Replayer`] over an existing record directory, logging every
//! replayed message, and runs to completion or until signaled.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod demo;
mod error;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobmesh_core::{RecorderConfig, RunnerConfig, SystemClock};
use jobmesh_pubsub::Node;
use jobmesh_recorder::{Recorder, Replayer};
use jobmesh_runtime::{JobRunner, JobRunnerConfig};
use tracing::info;

use crate::error::DaemonError;

fn main() -> Result<(), DaemonError> {
    setup_logging();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("record") => {
            let runner_config_path = args.next();
            let recorder_config_path = args.next().ok_or(DaemonError::MissingRecorderConfigPath)?;
            run_record(runner_config_path.as_deref(), &recorder_config_path)
        }
        Some("replay") => {
            let record_dir = args.next().ok_or(DaemonError::MissingRecordDir)?;
            let speed_up_rate = args.next().and_then(|s| s.parse::<f64>().ok()).unwrap_or(1.0);
            run_replay(&record_dir, speed_up_rate)
        }
        Some("--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some("--version" | "-v") => {
            println!("jobmeshd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(other) => Err(DaemonError::UnknownCommand(other.to_string())),
        None => Err(DaemonError::MissingCommand),
    }
}

fn print_help() {
    println!("jobmeshd {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    jobmeshd record <runner.json> <recorder.json>");
    println!("    jobmeshd replay <record_dir> [speed_up_rate]");
}

fn load_runner_config(path: Option<&str>) -> Result<RunnerConfig, DaemonError> {
    let Some(path) = path else { return Ok(RunnerConfig::default()) };
    let text = read_config_file(Path::new(path))?;
    Ok(RunnerConfig::from_json(&text)?)
}

fn load_recorder_config(path: &str) -> Result<RecorderConfig, DaemonError> {
    let text = read_config_file(Path::new(path))?;
    Ok(RecorderConfig::from_json(&text)?)
}

fn read_config_file(path: &Path) -> Result<String, DaemonError> {
    std::fs::read_to_string(path).map_err(|source| DaemonError::ReadConfig { path: path.to_path_buf(), source })
}

fn install_shutdown_handler() -> Result<Arc<AtomicBool>, DaemonError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        flag.store(true, Ordering::Release);
    })?;
    Ok(shutdown)
}

fn run_record(runner_config_path: Option<&str>, recorder_config_path: &str) -> Result<(), DaemonError> {
    let runner_config = load_runner_config(runner_config_path)?;
    let recorder_config = load_recorder_config(recorder_config_path)?;

    let runner = JobRunner::new(JobRunnerConfig::from(runner_config))?;
    let recorder = Recorder::new(recorder_config, &runner)?;
    recorder.register_channel::<demo::Heartbeat>(demo::HEARTBEAT_SUB_ID, Some("heartbeat".to_string()))?;
    recorder.register_channel::<demo::LogLine>(demo::LOG_LINE_SUB_ID, Some("log".to_string()))?;

    info!(record_dir = %recorder.get_record_dir().display(), "recording started");

    let shutdown = install_shutdown_handler()?;
    let publisher = Arc::new(Node::new(&runner));
    demo::spawn_publisher(Arc::clone(&publisher), SystemClock, Arc::clone(&shutdown));

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("recording stopped");
    drop(recorder);
    Ok(())
}

fn run_replay(record_dir: &str, speed_up_rate: f64) -> Result<(), DaemonError> {
    let record_dir = PathBuf::from(record_dir);
    let runner = JobRunner::new(JobRunnerConfig::default())?;
    let replayer = Arc::new(Replayer::new(record_dir, &runner));
    replayer.register_channel::<demo::Heartbeat>(demo::HEARTBEAT_SUB_ID)?;
    replayer.register_channel::<demo::LogLine>(demo::LOG_LINE_SUB_ID)?;
    replayer.set_speedup_rate(speed_up_rate);

    let subscriber = Node::new(&runner);
    subscriber.subscribe::<demo::Heartbeat>(demo::HEARTBEAT_SUB_ID, |m| info!(seq = m.seq, unix_ns = m.unix_ns, "heartbeat replayed"), None)?;
    subscriber.subscribe::<demo::LogLine>(demo::LOG_LINE_SUB_ID, |m| info!(text = %m.text, "log line replayed"), None)?;

    let shutdown = install_shutdown_handler()?;
    let loop_replayer = Arc::clone(&replayer);
    let loop_shutdown = Arc::clone(&shutdown);
    std::thread::spawn(move || {
        while !loop_shutdown.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(100));
        }
        loop_replayer.stop_main_loop();
    });

    info!(record_dir = %replayer.get_record_dir().display(), speed_up_rate, "replay started");
    replayer.main_loop();
    info!("replay finished");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
