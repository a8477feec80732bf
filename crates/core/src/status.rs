// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device upgrade status.
//!
//! One file per device under `status/devices/`, last-writer-wins. The
//! state machine driving a device is the only writer for its serial,
//! guaranteed by the at-most-one-non-terminal-job-per-serial rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time_fmt::iso_ts;

/// Upgrade status of a device.
///
/// `Complete`, `DownloadComplete`, `Failed`, `Cancelled`, and `Skipped`
/// are terminal: once recorded, the orchestrator stops mutating the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Pending,
    Validating,
    Downloading,
    Installing,
    Rebooting,
    Complete,
    DownloadComplete,
    Failed,
    Cancelled,
    Skipped,
}

impl UpgradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpgradeStatus::Complete
                | UpgradeStatus::DownloadComplete
                | UpgradeStatus::Failed
                | UpgradeStatus::Cancelled
                | UpgradeStatus::Skipped
        )
    }
}

crate::simple_display! {
    UpgradeStatus {
        Pending => "pending",
        Validating => "validating",
        Downloading => "downloading",
        Installing => "installing",
        Rebooting => "rebooting",
        Complete => "complete",
        DownloadComplete => "download_complete",
        Failed => "failed",
        Cancelled => "cancelled",
        Skipped => "skipped",
    }
}

/// Phase of the upgrade flow, recorded for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradePhase {
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "pre_flight_validation")]
    PreFlight,
    #[serde(rename = "software_check")]
    SoftwareCheck,
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "verify")]
    Verify,
    #[serde(rename = "install")]
    Install,
    #[serde(rename = "reboot")]
    Reboot,
    #[serde(rename = "post_flight_validation")]
    PostFlight,
    #[serde(rename = "complete")]
    Complete,
}

crate::simple_display! {
    UpgradePhase {
        Init => "init",
        PreFlight => "pre_flight_validation",
        SoftwareCheck => "software_check",
        Download => "download",
        Verify => "verify",
        Install => "install",
        Reboot => "reboot",
        PostFlight => "post_flight_validation",
        Complete => "complete",
    }
}

/// HA role of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaRole {
    Active,
    Passive,
    #[default]
    Standalone,
    Unknown,
}

crate::simple_display! {
    HaRole {
        Active => "active",
        Passive => "passive",
        Standalone => "standalone",
        Unknown => "unknown",
    }
}

/// One recorded error, appended to the device status for forensics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub phase: UpgradePhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

/// Result of the most recent disk-space check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskSpace {
    pub available_gb: f64,
    pub required_gb: f64,
    pub check_passed: bool,
}

/// Durable per-device record, written on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub serial: String,
    pub hostname: String,
    pub ha_role: HaRole,
    pub current_version: String,
    /// Version the device was at when the upgrade first left `pending`.
    /// Set exactly once and used for path lookup thereafter, so a
    /// partially-progressed device resolves the same path after a restart.
    #[serde(default)]
    pub starting_version: String,
    #[serde(default)]
    pub target_version: String,
    #[serde(default)]
    pub upgrade_path: Vec<String>,
    #[serde(default)]
    pub current_path_index: usize,
    pub upgrade_status: UpgradeStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<UpgradePhase>,
    #[serde(default)]
    pub upgrade_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_space: Option<DiskSpace>,
    #[serde(default)]
    pub downloaded_versions: Vec<String>,
    #[serde(default)]
    pub skipped_versions: Vec<String>,
    #[serde(default)]
    pub ready_for_install: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub skip_reason: String,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    pub last_updated: String,
}

impl DeviceStatus {
    pub fn new(serial: impl Into<String>, ts: DateTime<Utc>) -> Self {
        let serial = serial.into();
        Self {
            hostname: serial.clone(),
            serial,
            ha_role: HaRole::Standalone,
            current_version: String::new(),
            starting_version: String::new(),
            target_version: String::new(),
            upgrade_path: Vec::new(),
            current_path_index: 0,
            upgrade_status: UpgradeStatus::Pending,
            progress: 0,
            current_phase: None,
            upgrade_message: String::new(),
            disk_space: None,
            downloaded_versions: Vec::new(),
            skipped_versions: Vec::new(),
            ready_for_install: false,
            skip_reason: String::new(),
            errors: Vec::new(),
            last_updated: iso_ts(ts),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.upgrade_status.is_terminal()
    }

    /// True when a restarted daemon can pick this record up and continue:
    /// the upgrade is in flight and the path-lookup anchor is recorded.
    pub fn is_resumable(&self) -> bool {
        !self.is_terminal() && !self.starting_version.is_empty()
    }

    /// Enter a new phase. Progress never moves backwards across the record:
    /// a resumed device re-entering an earlier band keeps its high-water mark.
    pub fn begin_phase(
        &mut self,
        phase: UpgradePhase,
        status: UpgradeStatus,
        progress: u8,
        message: impl Into<String>,
        ts: DateTime<Utc>,
    ) {
        if self.is_terminal() {
            return;
        }
        self.current_phase = Some(phase);
        self.upgrade_status = status;
        self.progress = self.progress.max(progress);
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }

    /// Bump progress within the current phase (monotone non-decreasing).
    pub fn update_progress(&mut self, progress: u8, message: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.progress = self.progress.max(progress.min(100));
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }

    pub fn set_message(&mut self, message: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }

    /// Record an error and mark the device failed.
    pub fn fail(
        &mut self,
        phase: UpgradePhase,
        message: impl Into<String>,
        details: impl Into<String>,
        ts: DateTime<Utc>,
    ) {
        if self.is_terminal() {
            return;
        }
        let message = message.into();
        self.upgrade_status = UpgradeStatus::Failed;
        self.upgrade_message = message.clone();
        self.push_error(phase, message, details.into(), ts);
    }

    /// Record an error without changing the status (non-fatal problems).
    pub fn record_error(
        &mut self,
        phase: UpgradePhase,
        message: impl Into<String>,
        details: impl Into<String>,
        ts: DateTime<Utc>,
    ) {
        if self.is_terminal() {
            return;
        }
        self.push_error(phase, message.into(), details.into(), ts);
    }

    fn push_error(&mut self, phase: UpgradePhase, message: String, details: String, ts: DateTime<Utc>) {
        self.errors.push(ErrorRecord {
            timestamp: iso_ts(ts),
            phase,
            message,
            details,
        });
        self.last_updated = iso_ts(ts);
    }

    /// Mark the device skipped (no upgrade path for its version).
    pub fn skip(&mut self, reason: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        let reason = reason.into();
        self.upgrade_status = UpgradeStatus::Skipped;
        self.upgrade_message = format!("Skipped: {reason}");
        self.skip_reason = reason;
        self.last_updated = iso_ts(ts);
    }

    /// Mark the upgrade finished.
    pub fn complete(&mut self, message: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.upgrade_status = UpgradeStatus::Complete;
        self.current_phase = Some(UpgradePhase::Complete);
        self.progress = 100;
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }

    /// Mark a download-only run finished; the device holds every image.
    pub fn download_complete(&mut self, message: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.upgrade_status = UpgradeStatus::DownloadComplete;
        self.progress = 100;
        self.ready_for_install = true;
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }

    /// Mark the device cancelled at a checkpoint.
    pub fn cancel(&mut self, message: impl Into<String>, ts: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.upgrade_status = UpgradeStatus::Cancelled;
        self.upgrade_message = message.into();
        self.last_updated = iso_ts(ts);
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
