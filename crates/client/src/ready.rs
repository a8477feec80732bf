// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reboot readiness polling.

use march_core::Clock;
use std::time::Duration;

use crate::api::DeviceClient;

/// Polling envelope for [`wait_ready`].
#[derive(Debug, Clone, Copy)]
pub struct ReadyOpts {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for ReadyOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
            initial_interval: Duration::from_secs(15),
            max_interval: Duration::from_secs(300),
        }
    }
}

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Poll `system_info` until the device answers with a well-formed response.
///
/// Errors are expected here while the device is mid-reboot, so every failure
/// just schedules the next poll, with the interval growing 1.5× per miss
/// up to `max_interval`. `cancelled` is consulted between polls so an
/// operator cancellation does not wait out a reboot timeout.
pub async fn wait_ready(
    client: &dyn DeviceClient,
    opts: ReadyOpts,
    clock: &impl Clock,
    mut cancelled: impl FnMut() -> bool,
) -> ReadyOutcome {
    let start = clock.now();
    let mut interval = opts.initial_interval;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match client.system_info().await {
            Ok(info) => {
                tracing::info!(
                    serial = %info.serial,
                    version = %info.sw_version,
                    attempt,
                    "device is back online"
                );
                return ReadyOutcome::Ready;
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "device not ready yet");
            }
        }

        let next_wait = interval.max(Duration::from_millis(1));
        if clock.now().duration_since(start) + next_wait > opts.timeout {
            tracing::warn!(
                attempt,
                timeout_secs = opts.timeout.as_secs(),
                "device readiness timed out"
            );
            return ReadyOutcome::TimedOut;
        }
        if cancelled() {
            return ReadyOutcome::Cancelled;
        }
        tokio::time::sleep(interval).await;
        if cancelled() {
            return ReadyOutcome::Cancelled;
        }
        interval = interval.mul_f64(1.5).min(opts.max_interval);
    }
}

#[cfg(test)]
#[path = "ready_tests.rs"]
mod tests;
