// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON configuration shapes for the job runner and recorder.
//!
//! Parsing itself (locating and reading the config file, wiring it into a
//! CLI) is delegated to the binary crate; these types only describe the
//! shape and default-on-missing-field semantics. Unknown fields are
//! ignored (no `deny_unknown_fields`); a genuinely required field missing
//! (e.g. `period_sec` on a snapshot interval) is a fatal parse error
//! naming that field, which `serde_json` already reports by construction.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors parsing either config JSON document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `{ "thread_num": <u64>, "always_active": <u64>, "active_ms": <u64> }`
///
/// Any missing field defaults to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub thread_num: u64,
    pub always_active: u64,
    pub active_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { thread_num: 0, always_active: 0, active_ms: 0 }
    }
}

impl RunnerConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }
}

fn default_max_num_of_copies() -> u64 {
    48
}

/// One named snapshot cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotIntervalConfig {
    pub name: String,
    pub period_sec: u64,
    #[serde(default = "default_max_num_of_copies")]
    pub max_num_of_copies: u64,
}

/// The `"recorder"` object from the recorder config JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub record_dir: PathBuf,
    #[serde(default)]
    pub snapshot_intervals: Vec<SnapshotIntervalConfig>,
}

/// The top-level `{ "recorder": { ... } }` document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecorderConfigDoc {
    pub recorder: RecorderConfig,
}

impl RecorderConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let doc: RecorderConfigDoc = serde_json::from_str(s)?;
        Ok(doc.recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_config_defaults_missing_fields_to_zero() {
        let cfg = RunnerConfig::from_json(r#"{"thread_num": 4}"#).unwrap();
        assert_eq!(cfg, RunnerConfig { thread_num: 4, always_active: 0, active_ms: 0 });
    }

    #[test]
    fn runner_config_empty_object_is_all_zero() {
        let cfg = RunnerConfig::from_json("{}").unwrap();
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn recorder_config_defaults_record_dir_and_intervals() {
        let cfg = RecorderConfig::from_json(r#"{"recorder": {}}"#).unwrap();
        assert_eq!(cfg.record_dir, PathBuf::new());
        assert!(cfg.snapshot_intervals.is_empty());
    }

    #[test]
    fn recorder_config_interval_defaults_max_copies() {
        let cfg = RecorderConfig::from_json(
            r#"{"recorder": {"snapshot_intervals": [{"name": "hourly", "period_sec": 3600}]}}"#,
        )
        .unwrap();
        assert_eq!(cfg.snapshot_intervals.len(), 1);
        assert_eq!(cfg.snapshot_intervals[0].max_num_of_copies, 48);
    }

    #[test]
    fn recorder_config_missing_period_sec_is_a_fatal_parse_error() {
        let err = RecorderConfig::from_json(
            r#"{"recorder": {"snapshot_intervals": [{"name": "hourly"}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn recorder_config_ignores_unknown_fields() {
        let cfg =
            RecorderConfig::from_json(r#"{"recorder": {"record_dir": "/tmp/x"}, "extra": 1}"#)
                .unwrap();
        assert_eq!(cfg.record_dir, PathBuf::from("/tmp/x"));
    }
}
