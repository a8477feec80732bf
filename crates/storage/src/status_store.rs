// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device, daemon, and worker status persistence.

use march_core::{DaemonReport, DeviceStatus, WorkerReport};
use serde::Serialize;
use std::path::PathBuf;

use crate::atomic::{read_json, write_json, StoreError};
use crate::layout::WorkDir;

/// Wrapper for `status/workers.json`.
#[derive(Serialize)]
struct WorkerReportFile<'a> {
    workers: &'a [WorkerReport],
}

#[derive(Debug, Clone)]
pub struct StatusStore {
    devices_dir: PathBuf,
    daemon_file: PathBuf,
    workers_file: PathBuf,
}

impl StatusStore {
    pub fn new(work: &WorkDir) -> Self {
        Self {
            devices_dir: work.device_status_dir(),
            daemon_file: work.daemon_status_file(),
            workers_file: work.workers_status_file(),
        }
    }

    fn device_file(&self, serial: &str) -> PathBuf {
        self.devices_dir.join(format!("{serial}.json"))
    }

    pub fn save_device(&self, status: &DeviceStatus) -> Result<(), StoreError> {
        write_json(&self.device_file(&status.serial), status)
    }

    pub fn load_device(&self, serial: &str) -> Result<Option<DeviceStatus>, StoreError> {
        match read_json(&self.device_file(serial)) {
            Ok(status) => Ok(Some(status)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load the status for `serial` only if a restarted daemon should
    /// resume it: non-terminal and anchored by a `starting_version`.
    ///
    /// A stale or unreadable record is treated as absent, not fatal; the
    /// upgrade re-initializes from the live device instead.
    pub fn load_resumable(&self, serial: &str) -> Result<Option<DeviceStatus>, StoreError> {
        match self.load_device(serial) {
            Ok(Some(status)) if status.is_resumable() => Ok(Some(status)),
            Ok(_) => Ok(None),
            Err(StoreError::CorruptFile { path, source }) => {
                tracing::warn!(
                    serial,
                    path = %path.display(),
                    error = %source,
                    "ignoring corrupt device status; starting fresh"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn publish_daemon(&self, report: &DaemonReport) -> Result<(), StoreError> {
        write_json(&self.daemon_file, report)
    }

    pub fn publish_workers(&self, reports: &[WorkerReport]) -> Result<(), StoreError> {
        write_json(&self.workers_file, &WorkerReportFile { workers: reports })
    }
}

#[cfg(test)]
#[path = "status_store_tests.rs"]
mod tests;
