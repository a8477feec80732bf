// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fake device for tests.
//!
//! [`FakeDevice`] models one firewall: a software list, a disk, HA state,
//! and device-side jobs whose progress advances on every status poll.
//! Effects are applied the way a real device applies them: a finished
//! download marks the image downloaded, a finished install arms the
//! version for the next reboot.

use async_trait::async_trait;
use march_core::{HaRole, ValidationMetrics};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{
    ClientFactory, DeviceClient, DeviceJobStatus, HaState, JobOutcome, JobStage, SoftwareImage,
    SystemInfo,
};
use crate::error::ClientError;

/// How a fake device-side job behaves across status polls.
#[derive(Debug, Clone)]
pub enum JobScript {
    /// Advance `step` percent per poll, finish OK at 100.
    Succeed { step: u8 },
    /// Advance until `at`, then finish FAIL with `details`.
    FailAt { at: u8, details: String },
    /// Advance until `at`, then report the same progress forever.
    StallAt { at: u8 },
}

impl Default for JobScript {
    fn default() -> Self {
        JobScript::Succeed { step: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Download,
    Install,
}

#[derive(Debug)]
struct FakeJob {
    kind: JobKind,
    version: String,
    script: JobScript,
    progress: u8,
}

struct DeviceState {
    info: SystemInfo,
    ha: HaState,
    metrics: ValidationMetrics,
    metrics_after_reboot: Option<ValidationMetrics>,
    disk_gb: f64,
    refresh_ok: bool,
    images: BTreeMap<String, SoftwareImage>,
    jobs: HashMap<String, FakeJob>,
    next_job_id: u32,
    download_script: JobScript,
    download_scripts: HashMap<String, JobScript>,
    install_script: JobScript,
    download_refusals: u32,
    suppress_download_effect: bool,
    pending_version: Option<String>,
    reboot_outage_polls: u32,
    outage_left: u32,
    fail_queues: HashMap<&'static str, VecDeque<ClientError>>,
    calls: Vec<String>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

/// Cloneable handle to one fake device; clones share state.
#[derive(Clone)]
pub struct FakeDevice {
    inner: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(serial: &str, sw_version: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeviceState {
                info: SystemInfo {
                    hostname: format!("host-{serial}"),
                    serial: serial.to_string(),
                    sw_version: sw_version.to_string(),
                    model: "VM-300".to_string(),
                    mgmt_ip: String::new(),
                },
                ha: HaState::default(),
                metrics: ValidationMetrics {
                    tcp_sessions: 1000,
                    route_count: 0,
                    routes: Vec::new(),
                    arp_count: 0,
                    arp_entries: Vec::new(),
                    disk_available_gb: 0.0,
                },
                metrics_after_reboot: None,
                disk_gb: 20.0,
                refresh_ok: true,
                images: BTreeMap::new(),
                jobs: HashMap::new(),
                next_job_id: 0,
                download_script: JobScript::default(),
                download_scripts: HashMap::new(),
                install_script: JobScript::default(),
                download_refusals: 0,
                suppress_download_effect: false,
                pending_version: None,
                reboot_outage_polls: 0,
                outage_left: 0,
                fail_queues: HashMap::new(),
                calls: Vec::new(),
                journal: None,
            })),
        }
    }

    pub fn set_mgmt_ip(&self, ip: &str) {
        self.inner.lock().info.mgmt_ip = ip.to_string();
    }

    pub fn set_disk_gb(&self, gb: f64) {
        self.inner.lock().disk_gb = gb;
    }

    pub fn set_metrics(&self, metrics: ValidationMetrics) {
        self.inner.lock().metrics = metrics;
    }

    pub fn set_ha(&self, local: HaRole, peer: HaRole, peer_serial: &str) {
        self.inner.lock().ha = HaState {
            enabled: local != HaRole::Standalone,
            local_state: local,
            peer_state: peer,
            peer_serial: peer_serial.to_string(),
        };
    }

    pub fn set_refresh_ok(&self, ok: bool) {
        self.inner.lock().refresh_ok = ok;
    }

    pub fn add_image(&self, version: &str, downloaded: bool) {
        let mut state = self.inner.lock();
        let current = state.info.sw_version == version;
        state.images.insert(
            version.to_string(),
            SoftwareImage {
                version: version.to_string(),
                filename: format!("Image-{version}"),
                size: "400".to_string(),
                downloaded,
                current,
                sha256: String::new(),
            },
        );
    }

    /// Replace the device's metrics when the next reboot completes, to
    /// model post-upgrade drift.
    pub fn set_metrics_after_reboot(&self, metrics: ValidationMetrics) {
        self.inner.lock().metrics_after_reboot = Some(metrics);
    }

    pub fn set_download_script(&self, script: JobScript) {
        self.inner.lock().download_script = script;
    }

    /// Override the download behavior for one version only.
    pub fn set_download_script_for(&self, version: &str, script: JobScript) {
        self.inner.lock().download_scripts.insert(version.to_string(), script);
    }

    /// Finished downloads report OK but leave the image off the device.
    pub fn suppress_download_effect(&self) {
        self.inner.lock().suppress_download_effect = true;
    }

    pub fn set_install_script(&self, script: JobScript) {
        self.inner.lock().install_script = script;
    }

    /// Make the next `n` download_start calls return no job id.
    pub fn refuse_downloads(&self, n: u32) {
        self.inner.lock().download_refusals = n;
    }

    /// After a reboot, fail this many `system_info` calls before answering.
    pub fn set_reboot_outage(&self, polls: u32) {
        self.inner.lock().reboot_outage_polls = polls;
    }

    /// Inject an error for the next call of `op`.
    pub fn fail_next(&self, op: &'static str, err: ClientError) {
        self.inner.lock().fail_queues.entry(op).or_default().push_back(err);
    }

    // Inspection helpers.

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.starts_with(op)).count()
    }

    pub fn image(&self, version: &str) -> Option<SoftwareImage> {
        self.inner.lock().images.get(version).cloned()
    }

    pub fn current_version(&self) -> String {
        self.inner.lock().info.sw_version.clone()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    fn attach_journal(&self, journal: Arc<Mutex<Vec<String>>>) {
        self.inner.lock().journal = Some(journal);
    }

    fn enter(&self, op: &'static str, detail: &str) -> Result<(), ClientError> {
        let mut state = self.inner.lock();
        let entry = if detail.is_empty() {
            op.to_string()
        } else {
            format!("{op}:{detail}")
        };
        if let Some(journal) = &state.journal {
            journal.lock().push(format!("{}:{entry}", state.info.serial));
        }
        state.calls.push(entry);
        if let Some(err) = state.fail_queues.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(())
    }
}

fn advance(job: &mut FakeJob) -> DeviceJobStatus {
    let (progress, stage, outcome, details) = match &job.script {
        JobScript::Succeed { step } => {
            let progress = job.progress.saturating_add(*step).min(100);
            if progress >= 100 {
                (100, JobStage::Finished, Some(JobOutcome::Ok), String::new())
            } else {
                (progress, JobStage::Active, None, String::new())
            }
        }
        JobScript::FailAt { at, details } => {
            let progress = job.progress.saturating_add(25).min(*at);
            if progress >= *at {
                (*at, JobStage::Finished, Some(JobOutcome::Fail), details.clone())
            } else {
                (progress, JobStage::Active, None, String::new())
            }
        }
        JobScript::StallAt { at } => {
            let progress = job.progress.saturating_add(25).min(*at);
            (progress, JobStage::Active, None, String::new())
        }
    };
    job.progress = progress;
    DeviceJobStatus { stage, outcome, progress, details }
}

#[async_trait]
impl DeviceClient for FakeDevice {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        self.enter("system_info", "")?;
        let mut state = self.inner.lock();
        if state.outage_left > 0 {
            state.outage_left -= 1;
            return Err(ClientError::Connect("device rebooting".into()));
        }
        Ok(state.info.clone())
    }

    async fn ha_state(&self) -> Result<HaState, ClientError> {
        self.enter("ha_state", "")?;
        Ok(self.inner.lock().ha.clone())
    }

    async fn metrics(&self) -> Result<ValidationMetrics, ClientError> {
        self.enter("metrics", "")?;
        let state = self.inner.lock();
        let mut metrics = state.metrics.clone();
        metrics.disk_available_gb = state.disk_gb;
        Ok(metrics)
    }

    async fn disk_space(&self) -> Result<f64, ClientError> {
        self.enter("disk_space", "")?;
        Ok(self.inner.lock().disk_gb)
    }

    async fn refresh_software_list(&self, _timeout: Duration) -> Result<bool, ClientError> {
        self.enter("refresh_software_list", "")?;
        Ok(self.inner.lock().refresh_ok)
    }

    async fn software_info(&self, _timeout: Duration) -> Result<Vec<SoftwareImage>, ClientError> {
        self.enter("software_info", "")?;
        Ok(self.inner.lock().images.values().cloned().collect())
    }

    async fn download_start(&self, version: &str) -> Result<Option<String>, ClientError> {
        self.enter("download_start", version)?;
        let mut state = self.inner.lock();
        if state.download_refusals > 0 {
            state.download_refusals -= 1;
            return Ok(None);
        }
        state.next_job_id += 1;
        let job_id = format!("job-{}", state.next_job_id);
        let script = state
            .download_scripts
            .get(version)
            .cloned()
            .unwrap_or_else(|| state.download_script.clone());
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                kind: JobKind::Download,
                version: version.to_string(),
                script,
                progress: 0,
            },
        );
        Ok(Some(job_id))
    }

    async fn install_start(&self, version: &str) -> Result<Option<String>, ClientError> {
        self.enter("install_start", version)?;
        let mut state = self.inner.lock();
        state.next_job_id += 1;
        let job_id = format!("job-{}", state.next_job_id);
        let script = state.install_script.clone();
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                kind: JobKind::Install,
                version: version.to_string(),
                script,
                progress: 0,
            },
        );
        Ok(Some(job_id))
    }

    async fn reboot_start(&self) -> Result<bool, ClientError> {
        self.enter("reboot_start", "")?;
        let mut state = self.inner.lock();
        state.outage_left = state.reboot_outage_polls;
        if let Some(metrics) = state.metrics_after_reboot.take() {
            state.metrics = metrics;
        }
        if let Some(version) = state.pending_version.take() {
            state.info.sw_version = version.clone();
            for image in state.images.values_mut() {
                image.current = image.version == version;
            }
        }
        Ok(true)
    }

    async fn job_status(&self, job_id: &str) -> Result<DeviceJobStatus, ClientError> {
        self.enter("job_status", job_id)?;
        let mut state = self.inner.lock();
        let Some(mut job) = state.jobs.remove(job_id) else {
            return Err(ClientError::NotFound(format!("job {job_id}")));
        };
        let status = advance(&mut job);
        if status.is_success() {
            match job.kind {
                JobKind::Download if state.suppress_download_effect => {}
                JobKind::Download => {
                    let version = job.version.clone();
                    let current = state.info.sw_version == version;
                    let entry = state.images.entry(version.clone()).or_insert_with(|| SoftwareImage {
                        version: version.clone(),
                        filename: format!("Image-{version}"),
                        size: "400".to_string(),
                        downloaded: false,
                        current,
                        sha256: String::new(),
                    });
                    entry.downloaded = true;
                }
                JobKind::Install => {
                    state.pending_version = Some(job.version.clone());
                }
            }
        }
        state.jobs.insert(job_id.to_string(), job);
        Ok(status)
    }
}

/// Factory handing out fake devices by management address.
///
/// Keeps a journal of every operation across all registered devices, so
/// tests can assert cross-device ordering.
#[derive(Clone, Default)]
pub struct FakeFactory {
    devices: Arc<Mutex<HashMap<String, FakeDevice>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mgmt_ip: &str, device: FakeDevice) {
        device.set_mgmt_ip(mgmt_ip);
        device.attach_journal(self.journal.clone());
        self.devices.lock().insert(mgmt_ip.to_string(), device);
    }

    pub fn device(&self, mgmt_ip: &str) -> Option<FakeDevice> {
        self.devices.lock().get(mgmt_ip).cloned()
    }

    /// `serial:op[:detail]` entries in call order, across all devices.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }
}

impl ClientFactory for FakeFactory {
    fn client(&self, mgmt_ip: &str) -> Arc<dyn DeviceClient> {
        match self.devices.lock().get(mgmt_ip) {
            Some(device) => Arc::new(device.clone()),
            None => Arc::new(UnreachableDevice(mgmt_ip.to_string())),
        }
    }
}

/// Stand-in for an address with nothing behind it.
struct UnreachableDevice(String);

impl UnreachableDevice {
    fn err(&self) -> ClientError {
        ClientError::Connect(format!("no route to {}", self.0))
    }
}

#[async_trait]
impl DeviceClient for UnreachableDevice {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        Err(self.err())
    }

    async fn ha_state(&self) -> Result<HaState, ClientError> {
        Err(self.err())
    }

    async fn metrics(&self) -> Result<ValidationMetrics, ClientError> {
        Err(self.err())
    }

    async fn disk_space(&self) -> Result<f64, ClientError> {
        Err(self.err())
    }

    async fn refresh_software_list(&self, _timeout: Duration) -> Result<bool, ClientError> {
        Err(self.err())
    }

    async fn software_info(&self, _timeout: Duration) -> Result<Vec<SoftwareImage>, ClientError> {
        Err(self.err())
    }

    async fn download_start(&self, _version: &str) -> Result<Option<String>, ClientError> {
        Err(self.err())
    }

    async fn install_start(&self, _version: &str) -> Result<Option<String>, ClientError> {
        Err(self.err())
    }

    async fn reboot_start(&self) -> Result<bool, ClientError> {
        Err(self.err())
    }

    async fn job_status(&self, _job_id: &str) -> Result<DeviceJobStatus, ClientError> {
        Err(self.err())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
