// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-directory layout.
//!
//! The layout is a stable contract with external tools (submission CLI,
//! dashboards): every persisted entity lives at a fixed relative path.
//!
//! ```text
//! <work_dir>/
//!   config/{config.json, upgrade_paths.json}
//!   devices/inventory.json
//!   queue/{pending,active,completed,cancelled}/<job_id>.json
//!   commands/{incoming,processed}/<cmd_id>.json
//!   status/{daemon.json, workers.json, devices/<serial>.json}
//!   validation/{pre_flight,post_flight}/<serial>_<ts>.json
//!   logs/{structured,text}/
//! ```

use std::path::{Path, PathBuf};

use crate::atomic::{ensure_dirs, StoreError};

/// Every subdirectory the daemon creates on startup.
pub const WORK_SUBDIRS: &[&str] = &[
    "config",
    "devices",
    "queue/pending",
    "queue/active",
    "queue/completed",
    "queue/cancelled",
    "commands/incoming",
    "commands/processed",
    "status/devices",
    "validation/pre_flight",
    "validation/post_flight",
    "logs/structured",
    "logs/text",
];

/// Resolved work directory with typed path accessors.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the full directory tree.
    pub fn ensure(&self) -> Result<(), StoreError> {
        ensure_dirs(&self.root, WORK_SUBDIRS)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config/config.json")
    }

    pub fn upgrade_paths_file(&self) -> PathBuf {
        self.root.join("config/upgrade_paths.json")
    }

    pub fn inventory_file(&self) -> PathBuf {
        self.root.join("devices/inventory.json")
    }

    pub fn queue_pending(&self) -> PathBuf {
        self.root.join("queue/pending")
    }

    pub fn queue_active(&self) -> PathBuf {
        self.root.join("queue/active")
    }

    pub fn queue_completed(&self) -> PathBuf {
        self.root.join("queue/completed")
    }

    pub fn queue_cancelled(&self) -> PathBuf {
        self.root.join("queue/cancelled")
    }

    pub fn commands_incoming(&self) -> PathBuf {
        self.root.join("commands/incoming")
    }

    pub fn commands_processed(&self) -> PathBuf {
        self.root.join("commands/processed")
    }

    pub fn daemon_status_file(&self) -> PathBuf {
        self.root.join("status/daemon.json")
    }

    pub fn workers_status_file(&self) -> PathBuf {
        self.root.join("status/workers.json")
    }

    pub fn device_status_dir(&self) -> PathBuf {
        self.root.join("status/devices")
    }

    pub fn device_status_file(&self, serial: &str) -> PathBuf {
        self.device_status_dir().join(format!("{serial}.json"))
    }

    pub fn validation_pre_dir(&self) -> PathBuf {
        self.root.join("validation/pre_flight")
    }

    pub fn validation_post_dir(&self) -> PathBuf {
        self.root.join("validation/post_flight")
    }

    pub fn text_log_dir(&self) -> PathBuf {
        self.root.join("logs/text")
    }

    pub fn structured_log_dir(&self) -> PathBuf {
        self.root.join("logs/structured")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("marchd.pid")
    }
}
