// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic device-job poller.
//!
//! Waits for an asynchronous device-side job (download, install) to reach
//! a terminal state, surfacing progress to the caller and detecting the
//! one failure mode the device never reports itself: a wedged job whose
//! progress stops advancing.

use march_client::DeviceClient;
use march_core::Clock;
use std::time::Duration;

/// Polling envelope for [`wait_for_job`].
#[derive(Debug, Clone, Copy)]
pub struct PollOpts {
    pub interval: Duration,
    /// No-progress deadline. Measured from the last progress advance.
    pub stall_timeout: Duration,
    /// Overall deadline for the whole job.
    pub overall_timeout: Duration,
}

/// Terminal classification of a polled device job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Device reported FIN/OK.
    Success,
    /// Device reported a terminal non-OK result.
    Failed { details: String },
    /// Progress stopped advancing for the stall timeout.
    Stalled { last_progress: u8 },
    /// The overall deadline elapsed first.
    TimedOut { last_progress: u8 },
    /// The cancellation set named this job or device.
    Cancelled,
}

/// Poll `job_status` until the job terminates.
///
/// Status errors mid-flight are transient (they happen routinely around
/// reboots), so the poller keeps going until the overall timeout.
/// `progress_cb` fires only when progress strictly increases. `cancelled`
/// is consulted around the poll sleep, never while a request is in flight.
pub async fn wait_for_job(
    client: &dyn DeviceClient,
    job_id: &str,
    opts: PollOpts,
    clock: &impl Clock,
    mut cancelled: impl FnMut() -> bool,
    mut progress_cb: impl FnMut(u8),
) -> PollOutcome {
    let start = clock.now();
    let mut last_progress = 0u8;
    let mut last_advance = start;

    loop {
        match client.job_status(job_id).await {
            Ok(status) => {
                if status.progress > last_progress {
                    last_progress = status.progress;
                    last_advance = clock.now();
                    progress_cb(last_progress);
                }
                if status.is_success() {
                    return PollOutcome::Success;
                }
                if status.is_failure() {
                    let details = if status.details.is_empty() {
                        "device job reported failure".to_string()
                    } else {
                        status.details
                    };
                    return PollOutcome::Failed { details };
                }
                if clock.now().duration_since(last_advance) >= opts.stall_timeout {
                    return PollOutcome::Stalled { last_progress };
                }
            }
            Err(e) => {
                tracing::debug!(job_id, error = %e, "transient job status error, continuing to poll");
            }
        }

        if clock.now().duration_since(start) >= opts.overall_timeout {
            return PollOutcome::TimedOut { last_progress };
        }
        if cancelled() {
            return PollOutcome::Cancelled;
        }
        tokio::time::sleep(opts.interval).await;
        if cancelled() {
            return PollOutcome::Cancelled;
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
