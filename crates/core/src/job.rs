// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job file schema and shape validation.
//!
//! A job is a single operator request: upgrade one standalone device, one
//! HA pair, or download images only. Job files are owned by the dispatcher;
//! only it moves them between queue subdirectories and stamps the terminal
//! fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_fmt::iso_ts;

/// Kind of work a job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// One device, full upgrade.
    Standalone,
    /// Two devices paired active/passive; passive upgrades first.
    HaPair,
    /// One device, download and verify images without installing.
    DownloadOnly,
}

crate::simple_display! {
    JobType {
        Standalone => "standalone",
        HaPair => "ha_pair",
        DownloadOnly => "download_only",
    }
}

/// Terminal disposition stamped onto the job file by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Complete,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Complete => "complete",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A malformed job file, rejected before any side effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobShapeError {
    #[error("job has an empty job_id")]
    EmptyJobId,

    #[error("job {job_id}: {job_type} jobs take {expected} device(s), got {got}")]
    WrongDeviceCount {
        job_id: String,
        job_type: JobType,
        expected: usize,
        got: usize,
    },

    #[error("job {job_id}: device serial is empty")]
    EmptySerial { job_id: String },
}

/// One operator request, persisted as `queue/<state>/<job_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub devices: Vec<String>,
    /// Optional operator-facing label for HA pairs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ha_pair_name: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub download_only: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default = "default_state")]
    pub status: JobState,
}

fn default_state() -> JobState {
    JobState::Pending
}

impl Job {
    pub fn new(job_id: impl Into<String>, job_type: JobType, devices: Vec<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            devices,
            ha_pair_name: String::new(),
            dry_run: false,
            download_only: job_type == JobType::DownloadOnly,
            created_at: iso_ts(created_at),
            started_at: None,
            completed_at: None,
            status: JobState::Pending,
        }
    }

    /// Check the type/shape invariants: `ha_pair` jobs carry exactly two
    /// serials, everything else exactly one, all serials non-empty.
    pub fn validate(&self) -> Result<(), JobShapeError> {
        if self.job_id.is_empty() {
            return Err(JobShapeError::EmptyJobId);
        }
        let expected = match self.job_type {
            JobType::HaPair => 2,
            JobType::Standalone | JobType::DownloadOnly => 1,
        };
        if self.devices.len() != expected {
            return Err(JobShapeError::WrongDeviceCount {
                job_id: self.job_id.clone(),
                job_type: self.job_type,
                expected,
                got: self.devices.len(),
            });
        }
        if self.devices.iter().any(String::is_empty) {
            return Err(JobShapeError::EmptySerial { job_id: self.job_id.clone() });
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobState::Pending
    }

    /// Stamp the activation time. Called once when the dispatcher moves the
    /// file from pending to active.
    pub fn stamp_started(&mut self, ts: DateTime<Utc>) {
        self.started_at = Some(iso_ts(ts));
    }

    /// Stamp the terminal state and completion time.
    pub fn stamp_finished(&mut self, state: JobState, ts: DateTime<Utc>) {
        self.status = state;
        self.completed_at = Some(iso_ts(ts));
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
