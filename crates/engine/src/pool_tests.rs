// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use march_core::SystemClock;
use std::sync::atomic::AtomicUsize;
use tokio::sync::oneshot;

#[tokio::test]
async fn executes_submitted_work() {
    let pool = WorkerPool::start(2, 10, SystemClock);
    let counter = Arc::new(AtomicUsize::new(0));

    for i in 0..5 {
        let counter = counter.clone();
        assert!(pool.submit(&format!("job-{i}"), "fw001", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }

    // Shutdown drops queued work, so wait for the drain first.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < 5 {
        assert!(std::time::Instant::now() < deadline, "work never drained");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    pool.shutdown(Duration::from_secs(5)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn submit_returns_false_when_queue_is_full() {
    let pool = WorkerPool::start(1, 1, SystemClock);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    // Occupy the single worker.
    assert!(pool.submit("job-blocker", "fw000", async move {
        let _ = release_rx.await;
        Ok(())
    }));
    // Give the worker a moment to pick it up, then fill the queue.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pool.submit("job-queued", "fw001", async { Ok(()) }));

    // Queue (capacity 1) now holds one item; the next submit must bounce.
    let mut accepted = 0;
    for i in 0..3 {
        if pool.submit(&format!("job-extra-{i}"), "fw002", async { Ok(()) }) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 0);

    let _ = release_tx.send(());
    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn busy_worker_report_names_job_and_device() {
    let pool = WorkerPool::start(1, 10, SystemClock);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    pool.submit("job-1", "fw001", async move {
        let _ = release_rx.await;
        Ok(())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let reports = pool.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, WorkerState::Busy);
    assert_eq!(reports[0].job_id, "job-1");
    assert_eq!(reports[0].device, "fw001");

    let _ = release_tx.send(());
    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn worker_goes_idle_after_success() {
    let pool = WorkerPool::start(1, 10, SystemClock);
    pool.submit("job-1", "fw001", async { Ok(()) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.reports()[0].state, WorkerState::Idle);
    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn failed_task_marks_worker_error_until_next_item() {
    let pool = WorkerPool::start(1, 10, SystemClock);
    pool.submit("job-bad", "fw001", async { Err("boom".to_string()) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.reports()[0].state, WorkerState::Error);

    pool.submit("job-good", "fw002", async { Ok(()) });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.reports()[0].state, WorkerState::Idle);
    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let pool = WorkerPool::start(2, 10, SystemClock);
    pool.shutdown(Duration::from_secs(5)).await;
    assert!(!pool.submit("job-late", "fw001", async { Ok(()) }));
}

#[tokio::test]
async fn reports_match_pool_size() {
    let pool = WorkerPool::start(4, 10, SystemClock);
    let ids: Vec<usize> = pool.reports().iter().map(|r| r.worker_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    pool.shutdown(Duration::from_secs(5)).await;
}
