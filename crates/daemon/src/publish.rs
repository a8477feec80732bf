// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic status publication.
//!
//! Republishes `status/daemon.json` (aggregate queue counters) and
//! `status/workers.json` (per-worker slots) so external dashboards can
//! watch the fleet without talking to the daemon.

use march_core::{iso_ts, Clock, DaemonReport};
use march_engine::WorkerPool;
use march_storage::{JobQueue, StatusStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct StatusPublisher<C: Clock> {
    queue: JobQueue,
    store: StatusStore,
    pool: Arc<WorkerPool<C>>,
    clock: C,
    started_at: String,
}

impl<C: Clock> StatusPublisher<C> {
    pub fn new(queue: JobQueue, store: StatusStore, pool: Arc<WorkerPool<C>>, clock: C) -> Self {
        let started_at = iso_ts(clock.utc_now());
        Self { queue, store, pool, clock, started_at }
    }

    /// Write both status files once.
    pub fn publish(&self, running: bool) -> Result<(), StoreError> {
        let counts = self.queue.counts()?;
        let report = DaemonReport {
            running,
            workers: self.pool.size(),
            active_jobs: counts.active,
            pending_jobs: counts.pending,
            completed_jobs: counts.completed,
            failed_jobs: counts.failed,
            cancelled_jobs: counts.cancelled,
            started_at: self.started_at.clone(),
            last_updated: iso_ts(self.clock.utc_now()),
        };
        self.store.publish_daemon(&report)?;
        self.store.publish_workers(&self.pool.reports())
    }

    /// Republish on an interval until the token fires.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        loop {
            if let Err(e) = self.publish(true) {
                tracing::warn!(error = %e, "status publication failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
