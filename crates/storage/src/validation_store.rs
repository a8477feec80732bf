// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only validation snapshot history.
//!
//! Snapshot files are named `<serial>_<compact-ts>.json`, so lexical order
//! within one serial is time order and "newest pre-flight" is a sorted
//! directory scan away.

use chrono::{DateTime, Utc};
use march_core::{compact_ts, iso_ts, ValidationMetrics, ValidationReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::atomic::{read_json, write_json, StoreError};
use crate::layout::WorkDir;

/// One persisted metric snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub serial: String,
    pub timestamp: String,
    pub metrics: ValidationMetrics,
}

#[derive(Debug, Clone)]
pub struct ValidationStore {
    pre_dir: PathBuf,
    post_dir: PathBuf,
}

impl ValidationStore {
    pub fn new(work: &WorkDir) -> Self {
        Self {
            pre_dir: work.validation_pre_dir(),
            post_dir: work.validation_post_dir(),
        }
    }

    /// Persist a pre-flight snapshot. Written on failure too, for forensics.
    pub fn save_pre_flight(
        &self,
        serial: &str,
        metrics: &ValidationMetrics,
        ts: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.pre_dir.join(format!("{serial}_{}.json", compact_ts(ts)));
        let snapshot = Snapshot {
            serial: serial.to_string(),
            timestamp: iso_ts(ts),
            metrics: metrics.clone(),
        };
        write_json(&path, &snapshot)?;
        Ok(path)
    }

    pub fn save_post_flight(
        &self,
        serial: &str,
        report: &ValidationReport,
        ts: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.post_dir.join(format!("{serial}_{}.json", compact_ts(ts)));
        write_json(&path, report)?;
        Ok(path)
    }

    /// Newest pre-flight metrics for `serial`, if any snapshot exists.
    pub fn latest_pre_flight(&self, serial: &str) -> Result<Option<ValidationMetrics>, StoreError> {
        let entries = match std::fs::read_dir(&self.pre_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io { path: self.pre_dir.clone(), source: e })
            }
        };

        let prefix = format!("{serial}_");
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(String::from))
            .filter(|name| is_snapshot_of(name, &prefix))
            .collect();
        names.sort();

        let Some(newest) = names.last() else {
            return Ok(None);
        };
        let snapshot: Snapshot = read_json(&self.pre_dir.join(newest))?;
        Ok(Some(snapshot.metrics))
    }
}

/// Match `<serial>_<YYYYMMDD>_<HHMMSS>.json` exactly, so serial `fw1` does
/// not pick up snapshots of serial `fw1_lab`.
fn is_snapshot_of(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(stamp) = rest.strip_suffix(".json") else {
        return false;
    };
    let parts: Vec<&str> = stamp.split('_').collect();
    parts.len() == 2
        && parts[0].len() == 8
        && parts[1].len() == 6
        && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
#[path = "validation_store_tests.rs"]
mod tests;
