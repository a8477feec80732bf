// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token-bucket rate limiter for controller API traffic.
//!
//! One shared instance sits in front of every controller-bound client.
//! Direct-to-device clients run without one: each device sees only its own
//! request stream.

use async_trait::async_trait;
use march_core::{Clock, ValidationMetrics};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{DeviceClient, DeviceJobStatus, HaState, SoftwareImage, SystemInfo};
use crate::error::ClientError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous-refill token bucket. Capacity equals the per-minute refill,
/// so a full bucket allows a burst of one minute's quota.
pub struct RateLimiter<C: Clock> {
    refill_per_minute: f64,
    bucket: Mutex<Bucket>,
    clock: C,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(refill_per_minute: u32, clock: C) -> Self {
        let refill_per_minute = f64::from(refill_per_minute.max(1));
        let bucket = Bucket {
            tokens: refill_per_minute,
            last_refill: clock.now(),
        };
        Self {
            refill_per_minute,
            bucket: Mutex::new(bucket),
            clock,
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = self.clock.now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.refill_per_minute / 60.0).min(self.refill_per_minute);
        bucket.last_refill = now;
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token, waiting as long as it takes. The lock is never held
    /// across the sleep.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Tokens currently in the bucket (after refill).
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }
}

/// A [`DeviceClient`] that takes one token before every operation.
///
/// Controller-bound factories wrap their clients in this with one shared
/// limiter; direct-to-device factories skip it.
pub struct RateLimited<C: Clock> {
    inner: Arc<dyn DeviceClient>,
    limiter: Arc<RateLimiter<C>>,
}

impl<C: Clock> RateLimited<C> {
    pub fn new(inner: Arc<dyn DeviceClient>, limiter: Arc<RateLimiter<C>>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<C: Clock> DeviceClient for RateLimited<C> {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        self.limiter.acquire().await;
        self.inner.system_info().await
    }

    async fn ha_state(&self) -> Result<HaState, ClientError> {
        self.limiter.acquire().await;
        self.inner.ha_state().await
    }

    async fn metrics(&self) -> Result<ValidationMetrics, ClientError> {
        self.limiter.acquire().await;
        self.inner.metrics().await
    }

    async fn disk_space(&self) -> Result<f64, ClientError> {
        self.limiter.acquire().await;
        self.inner.disk_space().await
    }

    async fn refresh_software_list(&self, timeout: Duration) -> Result<bool, ClientError> {
        self.limiter.acquire().await;
        self.inner.refresh_software_list(timeout).await
    }

    async fn software_info(&self, timeout: Duration) -> Result<Vec<SoftwareImage>, ClientError> {
        self.limiter.acquire().await;
        self.inner.software_info(timeout).await
    }

    async fn download_start(&self, version: &str) -> Result<Option<String>, ClientError> {
        self.limiter.acquire().await;
        self.inner.download_start(version).await
    }

    async fn install_start(&self, version: &str) -> Result<Option<String>, ClientError> {
        self.limiter.acquire().await;
        self.inner.install_start(version).await
    }

    async fn reboot_start(&self) -> Result<bool, ClientError> {
        self.limiter.acquire().await;
        self.inner.reboot_start().await
    }

    async fn job_status(&self, job_id: &str) -> Result<DeviceJobStatus, ClientError> {
        self.limiter.acquire().await;
        self.inner.job_status(job_id).await
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
