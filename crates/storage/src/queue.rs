// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed job queue.
//!
//! A job file exists in exactly one of `pending/`, `active/`, `completed/`,
//! `cancelled/` at any instant; transitions are single `rename` calls.
//! Failed jobs land in `completed/` with `status: failed`, so `cancelled/`
//! holds only operator cancellations.

use chrono::{DateTime, Utc};
use march_core::{Job, JobState};
use std::path::{Path, PathBuf};

use crate::atomic::{read_json, write_json, StoreError};
use crate::layout::WorkDir;

/// Queue-tree counters for the daemon status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Owner of all job-file moves. Nothing else renames files in the queue tree.
#[derive(Debug, Clone)]
pub struct JobQueue {
    pending: PathBuf,
    active: PathBuf,
    completed: PathBuf,
    cancelled: PathBuf,
}

impl JobQueue {
    pub fn new(work: &WorkDir) -> Self {
        Self {
            pending: work.queue_pending(),
            active: work.queue_active(),
            completed: work.queue_completed(),
            cancelled: work.queue_cancelled(),
        }
    }

    /// Pending job files in lexical filename order (the FIFO contract).
    pub fn scan_pending(&self) -> Result<Vec<PathBuf>, StoreError> {
        scan_json_files(&self.pending)
    }

    pub fn load(&self, path: &Path) -> Result<Job, StoreError> {
        read_json(path)
    }

    /// Claim a pending job: rename it into `active/` and stamp `started_at`.
    ///
    /// The rename is the claim; if another process took the file first the
    /// rename fails and the caller moves on.
    pub fn activate(&self, path: &Path, ts: DateTime<Utc>) -> Result<(PathBuf, Job), StoreError> {
        let mut job: Job = read_json(path)?;
        let file_name = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.json", job.job_id)));
        let dest = self.active.join(file_name);

        std::fs::rename(path, &dest).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        job.stamp_started(ts);
        write_json(&dest, &job)?;
        Ok((dest, job))
    }

    /// Return an active job file to `pending/` (pool backpressure).
    pub fn demote(&self, active_path: &Path) -> Result<(), StoreError> {
        let Some(file_name) = active_path.file_name() else {
            return Ok(());
        };
        let dest = self.pending.join(file_name);
        std::fs::rename(active_path, &dest).map_err(|e| StoreError::Io {
            path: active_path.to_path_buf(),
            source: e,
        })
    }

    /// Move an active job to its terminal directory and stamp
    /// `status`/`completed_at`.
    pub fn finish(&self, job_id: &str, state: JobState, ts: DateTime<Utc>) -> Result<(), StoreError> {
        let source = self.active.join(format!("{job_id}.json"));
        let dest_dir = match state {
            JobState::Cancelled => &self.cancelled,
            _ => &self.completed,
        };
        let dest = dest_dir.join(format!("{job_id}.json"));

        let mut job: Job = read_json(&source)?;
        std::fs::rename(&source, &dest).map_err(|e| StoreError::Io { path: source, source: e })?;
        job.stamp_finished(state, ts);
        write_json(&dest, &job)
    }

    /// Reject a pending job without running it: stamp it failed and move
    /// it straight to `completed/`. Used for shape violations and
    /// duplicate submissions.
    pub fn reject_pending(
        &self,
        path: &Path,
        mut job: Job,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let dest = self.completed.join(format!("{}.json", job.job_id));
        std::fs::rename(path, &dest).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        job.stamp_finished(JobState::Failed, ts);
        write_json(&dest, &job)
    }

    /// Jobs currently in `active/`, for daemon restart recovery.
    pub fn active_jobs(&self) -> Result<Vec<(PathBuf, Job)>, StoreError> {
        let mut jobs = Vec::new();
        for path in scan_json_files(&self.active)? {
            match read_json::<Job>(&path) {
                Ok(job) => jobs.push((path, job)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable active job"),
            }
        }
        Ok(jobs)
    }

    /// Find a non-terminal job referencing `serial`, if any (the
    /// duplicate-job rule). Scans `pending/` and `active/`; pass the id
    /// of the job being checked so it does not match itself.
    pub fn serial_in_flight(
        &self,
        serial: &str,
        exclude_job_id: Option<&str>,
    ) -> Result<Option<Job>, StoreError> {
        for dir in [&self.pending, &self.active] {
            for path in scan_json_files(dir)? {
                let Ok(job) = read_json::<Job>(&path) else {
                    continue;
                };
                if exclude_job_id == Some(job.job_id.as_str()) {
                    continue;
                }
                if job.devices.iter().any(|d| d == serial) {
                    return Ok(Some(job));
                }
            }
        }
        Ok(None)
    }

    /// Find an active job referencing `serial`. The dispatcher's
    /// duplicate gate: pending jobs activate in scan order, so by the
    /// time a later duplicate is examined the winner is already active.
    pub fn serial_active(&self, serial: &str) -> Result<Option<Job>, StoreError> {
        for path in scan_json_files(&self.active)? {
            let Ok(job) = read_json::<Job>(&path) else {
                continue;
            };
            if job.devices.iter().any(|d| d == serial) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Count the queue tree. Completed files are split into `completed`
    /// and `failed` by their stamped status.
    pub fn counts(&self) -> Result<QueueCounts, StoreError> {
        let mut counts = QueueCounts {
            pending: scan_json_files(&self.pending)?.len(),
            active: scan_json_files(&self.active)?.len(),
            cancelled: scan_json_files(&self.cancelled)?.len(),
            ..QueueCounts::default()
        };
        for path in scan_json_files(&self.completed)? {
            match read_json::<Job>(&path) {
                Ok(job) if job.status == JobState::Failed => counts.failed += 1,
                Ok(_) => counts.completed += 1,
                Err(_) => counts.completed += 1,
            }
        }
        Ok(counts)
    }
}

fn scan_json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Io { path: dir.to_path_buf(), source: e }),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
