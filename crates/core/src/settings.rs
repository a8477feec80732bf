// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration surface (`config/config.json`).
//!
//! Every field has a default so a missing or partial config file still
//! yields a runnable daemon. Durations are stored as integer seconds, the
//! way operators edit them; accessors convert to [`Duration`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling on the pool size regardless of configuration.
pub const MAX_WORKERS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workers: WorkerSettings,
    pub controller: ControllerSettings,
    pub firewall: FirewallSettings,
    pub discovery: DiscoverySettings,
    pub validation: ValidationSettings,
    pub reboot: RebootSettings,
    pub jobs: JobSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub max: usize,
    pub queue_size: usize,
}

impl WorkerSettings {
    /// Configured pool size, clamped to [`MAX_WORKERS`] and at least one.
    pub fn effective_max(&self) -> usize {
        self.max.clamp(1, MAX_WORKERS)
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { max: 5, queue_size: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Token-bucket refill per minute for controller API traffic.
    pub rate_limit: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self { rate_limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSettings {
    pub software_check_timeout: u64,
    pub software_info_timeout: u64,
    pub download_timeout: u64,
    pub upgrade_timeout: u64,
    pub max_reboot_poll_interval: u64,
}

impl FirewallSettings {
    pub fn software_check_timeout(&self) -> Duration {
        Duration::from_secs(self.software_check_timeout)
    }

    pub fn software_info_timeout(&self) -> Duration {
        Duration::from_secs(self.software_info_timeout)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout)
    }

    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_secs(self.upgrade_timeout)
    }

    pub fn max_reboot_poll_interval(&self) -> Duration {
        Duration::from_secs(self.max_reboot_poll_interval)
    }
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            software_check_timeout: 90,
            software_info_timeout: 120,
            download_timeout: 1800,
            upgrade_timeout: 3600,
            max_reboot_poll_interval: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub retry_attempts: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self { retry_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Allowed TCP session drift, percent of the pre-flight count.
    pub tcp_session_margin: f64,
    /// Allowed route-count drift, absolute.
    pub route_margin: f64,
    /// Allowed ARP-count drift, absolute.
    pub arp_margin: f64,
    pub min_disk_gb: f64,
    pub retry_attempts: u32,
    pub retry_delay: u64,
    pub retry_backoff: f64,
}

impl ValidationSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            tcp_session_margin: 5.0,
            route_margin: 0.0,
            arp_margin: 0.0,
            min_disk_gb: 5.0,
            retry_attempts: 3,
            retry_delay: 5,
            retry_backoff: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebootSettings {
    /// Wait before the first readiness poll; the device must go down
    /// before polling means anything.
    pub initial_delay: u64,
    pub ready_timeout: u64,
    pub stabilization_delay: u64,
}

impl RebootSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_secs(self.stabilization_delay)
    }
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            initial_delay: 30,
            ready_timeout: 1800,
            stabilization_delay: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// No-progress deadline for device-side download/install jobs.
    pub stall_timeout: u64,
    pub poll_interval: u64,
    pub download_retry_attempts: u32,
}

impl JobSettings {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            stall_timeout: 300,
            poll_interval: 5,
            download_retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
