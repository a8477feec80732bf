// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodically republished daemon and worker status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time_fmt::iso_ts;

/// What a pool worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    Busy,
    Error,
}

crate::simple_display! {
    WorkerState {
        Idle => "idle",
        Busy => "busy",
        Error => "error",
    }
}

/// Per-worker slot in `status/workers.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub state: WorkerState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,
    pub last_updated: String,
}

impl WorkerReport {
    pub fn idle(worker_id: usize, ts: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            state: WorkerState::Idle,
            job_id: String::new(),
            device: String::new(),
            last_updated: iso_ts(ts),
        }
    }

    pub fn set(&mut self, state: WorkerState, job_id: &str, device: &str, ts: DateTime<Utc>) {
        self.state = state;
        self.job_id = job_id.to_string();
        self.device = device.to_string();
        self.last_updated = iso_ts(ts);
    }
}

/// Aggregate daemon counters in `status/daemon.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonReport {
    pub running: bool,
    pub workers: usize,
    pub active_jobs: usize,
    pub pending_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub started_at: String,
    pub last_updated: String,
}

impl DaemonReport {
    pub fn new(workers: usize, ts: DateTime<Utc>) -> Self {
        Self {
            running: false,
            workers,
            active_jobs: 0,
            pending_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
            started_at: String::new(),
            last_updated: iso_ts(ts),
        }
    }
}
