// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide cancellation set.
//!
//! The dispatcher adds targets when cancel commands arrive; each upgrade
//! task reads the set at its checkpoints. Cancellation is advisory: an
//! already-issued device job runs to completion on the device, the
//! orchestrator just stops observing it.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Default)]
struct Targets {
    jobs: HashSet<String>,
    devices: HashSet<String>,
}

/// Shared set of cancelled job ids and device serials.
#[derive(Clone, Default)]
pub struct CancelSet {
    inner: Arc<Mutex<Targets>>,
}

impl CancelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_job(&self, job_id: &str) {
        self.inner.lock().jobs.insert(job_id.to_string());
        tracing::info!(job_id, "marked job for cancellation");
    }

    pub fn cancel_device(&self, serial: &str) {
        self.inner.lock().devices.insert(serial.to_string());
        tracing::info!(serial, "marked device for cancellation");
    }

    /// True when either the job or the device has been cancelled.
    pub fn is_cancelled(&self, job_id: &str, serial: &str) -> bool {
        let targets = self.inner.lock();
        targets.jobs.contains(job_id) || targets.devices.contains(serial)
    }

    pub fn is_job_cancelled(&self, job_id: &str) -> bool {
        self.inner.lock().jobs.contains(job_id)
    }
}
