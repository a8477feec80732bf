// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue watcher and dispatcher.
//!
//! A bounded periodic scan over `commands/incoming/` and `queue/pending/`.
//! Commands are consumed first so a cancel racing its own job is visible
//! by the job's first checkpoint. Job files are claimed with an atomic
//! rename into `queue/active/`; the completion callback moves them to
//! their terminal directory.

use march_client::ClientFactory;
use march_core::{CancelCommand, Clock, Job};
use march_engine::{CancelSet, Runner, WorkerPool};
use march_storage::{JobQueue, WorkDir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Dispatcher<F: ClientFactory, C: Clock> {
    commands_incoming: PathBuf,
    commands_processed: PathBuf,
    queue: JobQueue,
    cancel: CancelSet,
    pool: Arc<WorkerPool<C>>,
    runner: Arc<Runner<F, C>>,
    clock: C,
}

impl<F: ClientFactory, C: Clock> Dispatcher<F, C> {
    pub fn new(
        work: &WorkDir,
        queue: JobQueue,
        cancel: CancelSet,
        pool: Arc<WorkerPool<C>>,
        runner: Arc<Runner<F, C>>,
        clock: C,
    ) -> Self {
        Self {
            commands_incoming: work.commands_incoming(),
            commands_processed: work.commands_processed(),
            queue,
            cancel,
            pool,
            runner,
            clock,
        }
    }

    /// Scan loop. Runs until the token fires.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!("dispatcher started");
        loop {
            self.tick();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("dispatcher stopped");
    }

    /// One scan: commands first, then pending jobs.
    pub fn tick(&self) {
        self.process_commands();
        self.dispatch_pending();
    }

    /// Re-submit every job already in `active/` (daemon restart
    /// recovery). Per-device status files carry the resume point.
    pub fn recover(&self) -> usize {
        let jobs = match self.queue.active_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "could not scan active queue for recovery");
                return 0;
            }
        };
        let mut resubmitted = 0;
        for (_path, job) in jobs {
            tracing::info!(job_id = %job.job_id, "re-submitting interrupted job");
            if self.submit(job) {
                resubmitted += 1;
            }
        }
        resubmitted
    }

    fn process_commands(&self) {
        for path in scan_json(&self.commands_incoming) {
            match march_storage::read_json::<CancelCommand>(&path) {
                Ok(cmd) if cmd.command == CancelCommand::COMMAND && cmd.has_target() => {
                    if !cmd.job_id.is_empty() {
                        self.cancel.cancel_job(&cmd.job_id);
                    }
                    if !cmd.device_serial.is_empty() {
                        self.cancel.cancel_device(&cmd.device_serial);
                    }
                    tracing::info!(
                        job_id = %cmd.job_id,
                        device = %cmd.device_serial,
                        reason = %cmd.reason,
                        "cancellation command accepted"
                    );
                }
                Ok(cmd) => {
                    tracing::warn!(
                        path = %path.display(),
                        command = %cmd.command,
                        "ignoring command with unknown type or no target"
                    );
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "unreadable command file");
                }
            }
            self.archive_command(&path);
        }
    }

    fn archive_command(&self, path: &Path) {
        let Some(name) = path.file_name() else {
            return;
        };
        let dest = self.commands_processed.join(name);
        if let Err(e) = std::fs::rename(path, &dest) {
            tracing::error!(path = %path.display(), error = %e, "could not archive command file");
        }
    }

    fn dispatch_pending(&self) {
        let pending = match self.queue.scan_pending() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!(error = %e, "could not scan pending queue");
                return;
            }
        };

        for path in pending {
            let job = match self.queue.load(&path) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "unreadable job file, setting aside");
                    let _ = std::fs::rename(&path, path.with_extension("rejected"));
                    continue;
                }
            };

            if let Err(e) = job.validate() {
                tracing::error!(job_id = %job.job_id, error = %e, "rejecting malformed job");
                if let Err(e) = self.queue.reject_pending(&path, job, self.clock.utc_now()) {
                    tracing::error!(error = %e, "could not reject job file");
                }
                continue;
            }

            // Duplicate-job rule: a serial may be referenced by at most
            // one non-terminal job. Submission tools enforce this; a
            // duplicate that slips through is rejected here rather than
            // risking two writers on one status file.
            if let Some(other) = self.duplicate_of(&job) {
                tracing::error!(
                    job_id = %job.job_id,
                    existing_job = %other,
                    "rejecting duplicate job for a device already in flight"
                );
                if let Err(e) = self.queue.reject_pending(&path, job, self.clock.utc_now()) {
                    tracing::error!(error = %e, "could not reject duplicate job file");
                }
                continue;
            }

            let (active_path, job) = match self.queue.activate(&path, self.clock.utc_now()) {
                Ok(activated) => activated,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not activate job (already claimed?)");
                    continue;
                }
            };
            tracing::info!(job_id = %job.job_id, "job activated");

            if !self.submit(job) {
                // Pool is saturated; put the job back and let a later
                // scan retry the rest of the queue too.
                if let Err(e) = self.queue.demote(&active_path) {
                    tracing::error!(error = %e, "could not return job to pending");
                }
                break;
            }
        }
    }

    fn duplicate_of(&self, job: &Job) -> Option<String> {
        for serial in &job.devices {
            match self.queue.serial_active(serial) {
                Ok(Some(existing)) if existing.job_id != job.job_id => {
                    return Some(existing.job_id);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(serial = %serial, error = %e, "duplicate check failed, allowing job");
                }
            }
        }
        None
    }

    /// Hand one job to the pool. The task owns the job file's terminal
    /// move.
    fn submit(&self, job: Job) -> bool {
        let display_device = job.devices.join(",");
        let job_id = job.job_id.clone();
        let runner = self.runner.clone();
        let queue = self.queue.clone();
        let clock = self.clock.clone();

        self.pool.submit(&job_id, &display_device, async move {
            let state = runner.run_job(&job).await;
            queue
                .finish(&job.job_id, state, clock.utc_now())
                .map_err(|e| format!("could not finalize job file: {e}"))
        })
    }
}

fn scan_json(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
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
    paths
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
