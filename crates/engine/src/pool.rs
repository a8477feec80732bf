// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool.
//!
//! A fixed set of workers drains a bounded queue of upgrade tasks. The
//! pool is the only place work is multiplexed; each task is internally
//! sequential. `submit` never blocks: a full queue returns `false` and
//! the dispatcher backpressures by leaving the job in `pending/`.

use march_core::{Clock, WorkerReport, WorkerState};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Work = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

struct WorkItem {
    job_id: String,
    device: String,
    work: Work,
}

enum Msg {
    Work(Box<WorkItem>),
    Stop,
}

/// Fixed-size pool of upgrade workers.
pub struct WorkerPool<C: Clock> {
    tx: mpsc::Sender<Msg>,
    reports: Arc<Vec<Mutex<WorkerReport>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
    size: usize,
    clock: C,
}

impl<C: Clock> WorkerPool<C> {
    /// Start `size` workers over a queue of `queue_size` slots.
    pub fn start(size: usize, queue_size: usize, clock: C) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<Msg>(queue_size.max(size));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let reports: Arc<Vec<Mutex<WorkerReport>>> = Arc::new(
            (0..size).map(|id| Mutex::new(WorkerReport::idle(id, clock.utc_now()))).collect(),
        );
        let stopping = Arc::new(AtomicBool::new(false));

        let handles = (0..size)
            .map(|id| {
                let rx = rx.clone();
                let reports = reports.clone();
                let stopping = stopping.clone();
                let clock = clock.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker = id, "worker started");
                    loop {
                        let msg = { rx.lock().await.recv().await };
                        match msg {
                            Some(Msg::Work(item)) => {
                                if stopping.load(Ordering::SeqCst) {
                                    tracing::warn!(
                                        worker = id,
                                        job_id = %item.job_id,
                                        "dropping queued work during shutdown"
                                    );
                                    continue;
                                }
                                reports[id].lock().set(
                                    WorkerState::Busy,
                                    &item.job_id,
                                    &item.device,
                                    clock.utc_now(),
                                );
                                tracing::info!(
                                    worker = id,
                                    job_id = %item.job_id,
                                    device = %item.device,
                                    "worker picked up job"
                                );
                                match item.work.await {
                                    Ok(()) => {
                                        reports[id].lock().set(
                                            WorkerState::Idle,
                                            "",
                                            "",
                                            clock.utc_now(),
                                        );
                                    }
                                    Err(e) => {
                                        tracing::error!(
                                            worker = id,
                                            job_id = %item.job_id,
                                            error = %e,
                                            "job task failed at worker top level"
                                        );
                                        reports[id].lock().set(
                                            WorkerState::Error,
                                            &item.job_id,
                                            &item.device,
                                            clock.utc_now(),
                                        );
                                    }
                                }
                            }
                            Some(Msg::Stop) | None => break,
                        }
                    }
                    tracing::debug!(worker = id, "worker stopped");
                })
            })
            .collect();

        Self {
            tx,
            reports,
            handles: Mutex::new(handles),
            stopping,
            size,
            clock,
        }
    }

    /// Queue one task. Returns `false` when the queue is full or the pool
    /// is stopping.
    pub fn submit(
        &self,
        job_id: &str,
        device: &str,
        work: impl Future<Output = Result<(), String>> + Send + 'static,
    ) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        let item = Box::new(WorkItem {
            job_id: job_id.to_string(),
            device: device.to_string(),
            work: Box::pin(work),
        });
        match self.tx.try_send(Msg::Work(item)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(job_id, "work queue full, cannot submit");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Snapshot of every worker's report for status publication.
    pub fn reports(&self) -> Vec<WorkerReport> {
        self.reports.iter().map(|slot| slot.lock().clone()).collect()
    }

    /// Stop the pool: flag stop, enqueue one sentinel per worker, join
    /// with a deadline. Workers finish their current task first.
    pub async fn shutdown(&self, deadline: Duration) {
        self.stopping.store(true, Ordering::SeqCst);
        for _ in 0..self.size {
            if self.tx.send(Msg::Stop).await.is_err() {
                break;
            }
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                tracing::warn!("worker did not stop within deadline");
            }
        }
        let now = self.clock.utc_now();
        for slot in self.reports.iter() {
            slot.lock().set(WorkerState::Idle, "", "", now);
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
