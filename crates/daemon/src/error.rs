// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Top-level errors for the `jobmeshd` binary.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig { path: std::path::PathBuf, #[source] source: std::io::Error },

    #[error(transparent)]
    Config(#[from] jobmesh_core::ConfigError),

    #[error(transparent)]
    Recorder(#[from] jobmesh_recorder::RecorderError),

    #[error(transparent)]
    Runner(#[from] jobmesh_runtime::RunnerError),

    #[error(transparent)]
    Replay(#[from] jobmesh_recorder::ReplayError),

    #[error(transparent)]
    Subscribe(#[from] jobmesh_core::CoreError),

    #[error("unknown subcommand {0:?}, expected \"record\" or \"replay\"")]
    UnknownCommand(String),

    #[error("usage: jobmeshd <record|replay> ...")]
    MissingCommand,

    #[error("record requires a recorder config path, e.g. jobmeshd record recorder.json")]
    MissingRecorderConfigPath,

    #[error("replay requires a record directory, e.g. jobmeshd replay ./records/record.20260729-120000.pid.42")]
    MissingRecordDir,

    #[error("failed to install signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}
