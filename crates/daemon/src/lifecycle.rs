// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, recovery, signals, shutdown.

use fs2::FileExt;
use march_client::ClientFactory;
use march_core::SystemClock;
use march_engine::{CancelSet, Runner, Validator, WorkerPool};
use march_storage::{
    load_settings, load_upgrade_paths, resolve_work_dir, Inventory, JobQueue, StatusStore,
    StoreError, ValidationStore, WorkDir,
};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::publish::StatusPublisher;

/// How often the dispatcher rescans the queue and command directories.
const SCAN_INTERVAL: Duration = Duration::from_secs(2);
/// How often status files are republished.
const PUBLISH_INTERVAL: Duration = Duration::from_secs(5);
/// Grace period for workers at shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Startup options from the command line.
#[derive(Debug, Clone, Default)]
pub struct DaemonOpts {
    /// Explicit work directory; otherwise resolved from the environment.
    pub work_dir: Option<PathBuf>,
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock at {path}: daemon already running?")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully constructed daemon, ready to run.
pub struct Daemon<F: ClientFactory> {
    work: WorkDir,
    dispatcher: Arc<Dispatcher<F, SystemClock>>,
    publisher: Arc<StatusPublisher<SystemClock>>,
    pool: Arc<WorkerPool<SystemClock>>,
    shutdown: CancellationToken,
    // NOTE(lifetime): held to keep the exclusive PID lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl<F: ClientFactory> Daemon<F> {
    /// Resolve the work directory, take the lock, and wire every
    /// component together. No background tasks start here.
    pub fn start(opts: DaemonOpts, factory: F) -> Result<Self, LifecycleError> {
        let resolution = resolve_work_dir(opts.work_dir);
        tracing::info!("{}", resolution.describe());

        let work = WorkDir::new(resolution.path);
        work.ensure()?;
        let lock_file = acquire_lock(&work)?;

        let settings = load_settings(&work)?;
        let paths = load_upgrade_paths(&work)?;
        let inventory = Inventory::load(work.inventory_file())?;
        let clock = SystemClock;

        let queue = JobQueue::new(&work);
        let statuses = StatusStore::new(&work);
        let cancel = CancelSet::new();
        let validator = Validator::new(
            ValidationStore::new(&work),
            settings.validation.clone(),
            clock,
        );
        let pool = Arc::new(WorkerPool::start(
            settings.workers.effective_max(),
            settings.workers.queue_size,
            clock,
        ));
        let runner = Arc::new(Runner::new(
            settings.clone(),
            paths,
            inventory,
            statuses.clone(),
            validator,
            cancel.clone(),
            factory,
            clock,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            &work,
            queue.clone(),
            cancel,
            pool.clone(),
            runner,
            clock,
        ));
        let publisher = Arc::new(StatusPublisher::new(queue, statuses, pool.clone(), clock));

        tracing::info!(
            workers = pool.size(),
            work_dir = %work.root().display(),
            "daemon constructed"
        );
        Ok(Self {
            work,
            dispatcher,
            publisher,
            pool,
            shutdown: CancellationToken::new(),
            lock_file,
        })
    }

    /// Token that stops [`Self::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until a termination signal (or the shutdown token) fires, then
    /// stop cleanly.
    pub async fn run(&self) -> Result<(), LifecycleError> {
        let recovered = self.dispatcher.recover();
        if recovered > 0 {
            tracing::info!(recovered, "re-submitted interrupted jobs from the active queue");
        }
        if let Err(e) = self.publisher.publish(true) {
            tracing::warn!(error = %e, "initial status publication failed");
        }

        let dispatch_task = {
            let dispatcher = self.dispatcher.clone();
            let token = self.shutdown.clone();
            tokio::spawn(async move { dispatcher.run(SCAN_INTERVAL, token).await })
        };
        let publish_task = {
            let publisher = self.publisher.clone();
            let token = self.shutdown.clone();
            tokio::spawn(async move { publisher.run(PUBLISH_INTERVAL, token).await })
        };

        wait_for_stop(&self.shutdown).await;
        tracing::info!("shutting down");

        self.shutdown.cancel();
        let _ = dispatch_task.await;
        let _ = publish_task.await;

        self.pool.shutdown(SHUTDOWN_DEADLINE).await;
        if let Err(e) = self.publisher.publish(false) {
            tracing::warn!(error = %e, "final status publication failed");
        }
        if let Err(e) = std::fs::remove_file(self.work.pid_file()) {
            tracing::warn!(error = %e, "could not remove pid file");
        }
        tracing::info!("daemon stopped");
        Ok(())
    }
}

fn acquire_lock(work: &WorkDir) -> Result<File, LifecycleError> {
    let path = work.pid_file();
    let mut file = File::options()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(LifecycleError::Io)?;
    file.try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed { path: path.clone(), source: e })?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Wait for SIGINT, SIGTERM, or the shutdown token.
async fn wait_for_stop(token: &CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "could not install SIGTERM handler");
                token.cancelled().await;
                return;
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("received interrupt"),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
