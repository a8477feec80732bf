// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The device capability trait and its response types.

use async_trait::async_trait;
use march_core::{HaRole, ValidationMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;

/// `show system info` essentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub serial: String,
    pub sw_version: String,
    pub model: String,
    pub mgmt_ip: String,
}

/// High-availability state as reported by the device itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaState {
    pub enabled: bool,
    pub local_state: HaRole,
    pub peer_state: HaRole,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_serial: String,
}

/// One entry of the device's software list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareImage {
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    pub downloaded: bool,
    pub current: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}

/// Lifecycle stage of a device-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    #[serde(rename = "PEND")]
    Pending,
    #[serde(rename = "ACT")]
    Active,
    #[serde(rename = "FIN")]
    Finished,
}

/// Terminal result of a finished device-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

/// Status of an asynchronous device-side job (download, install).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceJobStatus {
    pub stage: JobStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl DeviceJobStatus {
    /// Finished successfully.
    pub fn is_success(&self) -> bool {
        self.stage == JobStage::Finished && self.outcome == Some(JobOutcome::Ok)
    }

    /// Finished with anything other than OK.
    pub fn is_failure(&self) -> bool {
        self.stage == JobStage::Finished && self.outcome != Some(JobOutcome::Ok)
    }
}

/// Typed operations against one device.
///
/// All operations are request/response over the appliance's
/// operational-command API; the wire encoding lives behind this trait.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn system_info(&self) -> Result<SystemInfo, ClientError>;

    async fn ha_state(&self) -> Result<HaState, ClientError>;

    /// Composite metric snapshot (sessions, routes, ARP, disk) fetched as
    /// one logical operation.
    async fn metrics(&self) -> Result<ValidationMetrics, ClientError>;

    /// Available gigabytes on the software repository partition.
    async fn disk_space(&self) -> Result<f64, ClientError>;

    /// Ask the device to refresh its available-software list from the
    /// vendor servers. Non-fatal: callers log and continue on `false`.
    async fn refresh_software_list(&self, timeout: Duration) -> Result<bool, ClientError>;

    async fn software_info(&self, timeout: Duration) -> Result<Vec<SoftwareImage>, ClientError>;

    /// Start downloading `version`. Returns the device job id, or `None`
    /// when the device acknowledged without creating a job.
    async fn download_start(&self, version: &str) -> Result<Option<String>, ClientError>;

    /// Start installing `version`. Returns the device job id.
    async fn install_start(&self, version: &str) -> Result<Option<String>, ClientError>;

    async fn reboot_start(&self) -> Result<bool, ClientError>;

    async fn job_status(&self, job_id: &str) -> Result<DeviceJobStatus, ClientError>;
}

/// Creates per-device clients from management addresses.
///
/// The controller-side factory shares one rate limiter across all clients;
/// direct-to-device factories may run unlimited.
pub trait ClientFactory: Send + Sync + 'static {
    fn client(&self, mgmt_ip: &str) -> Arc<dyn DeviceClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_stage_uses_device_wire_names() {
        assert_eq!(serde_json::to_string(&JobStage::Pending).unwrap(), "\"PEND\"");
        assert_eq!(serde_json::to_string(&JobStage::Active).unwrap(), "\"ACT\"");
        assert_eq!(serde_json::to_string(&JobStage::Finished).unwrap(), "\"FIN\"");
        assert_eq!(serde_json::to_string(&JobOutcome::Ok).unwrap(), "\"OK\"");
    }

    #[test]
    fn success_requires_fin_and_ok() {
        let status = DeviceJobStatus {
            stage: JobStage::Finished,
            outcome: Some(JobOutcome::Ok),
            progress: 100,
            details: String::new(),
        };
        assert!(status.is_success());
        assert!(!status.is_failure());
    }

    #[test]
    fn fin_without_ok_is_failure() {
        for outcome in [Some(JobOutcome::Fail), None] {
            let status = DeviceJobStatus {
                stage: JobStage::Finished,
                outcome,
                progress: 80,
                details: "disk full".into(),
            };
            assert!(status.is_failure(), "{outcome:?}");
        }
    }

    #[test]
    fn active_job_is_neither() {
        let status = DeviceJobStatus {
            stage: JobStage::Active,
            outcome: None,
            progress: 45,
            details: String::new(),
        };
        assert!(!status.is_success());
        assert!(!status.is_failure());
    }
}
