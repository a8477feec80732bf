// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device upgrade state machine.
//!
//! One runner drives every upgrade task in the process. Each task owns its
//! device's status file for the duration of the job (the dispatcher's
//! duplicate-job rule guarantees a single writer per serial), and persists
//! the record on every transition so a restarted daemon resumes exactly
//! where the last write left off.

use march_client::{ClientFactory, DeviceClient, ReadyOpts, ReadyOutcome};
use march_core::{
    Clock, DeviceStatus, DiskSpace, HaRole, Job, JobState, JobType, Settings, UpgradePaths,
    UpgradePhase, UpgradeStatus,
};
use march_storage::{DeviceRecord, Inventory, StatusStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelSet;
use crate::poller::{wait_for_job, PollOpts, PollOutcome};
use crate::validator::{PostFlight, PreFlightError, Validator};

/// Terminal result of one device task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Complete,
    DownloadComplete,
    Skipped,
    Failed,
    Cancelled,
}

impl TaskOutcome {
    /// Disposition for the owning job file.
    pub fn job_state(self) -> JobState {
        match self {
            TaskOutcome::Complete | TaskOutcome::DownloadComplete => JobState::Complete,
            TaskOutcome::Cancelled => JobState::Cancelled,
            TaskOutcome::Skipped | TaskOutcome::Failed => JobState::Failed,
        }
    }
}

/// Progress band a download pass maps its per-version progress into.
#[derive(Debug, Clone, Copy)]
struct Band {
    base: usize,
    span: usize,
}

const UPGRADE_DOWNLOAD_BAND: Band = Band { base: 15, span: 35 };
const DOWNLOAD_ONLY_BAND: Band = Band { base: 10, span: 80 };

/// Pause standing in for an external side effect during a dry run.
const DRY_RUN_PAUSE: Duration = Duration::from_millis(150);

pub struct Runner<F: ClientFactory, C: Clock> {
    settings: Settings,
    paths: UpgradePaths,
    inventory: Mutex<Inventory>,
    statuses: StatusStore,
    validator: Validator<C>,
    cancel: CancelSet,
    factory: F,
    clock: C,
    /// Serials whose software list was refreshed in this process.
    refreshed: Mutex<HashSet<String>>,
}

impl<F: ClientFactory, C: Clock> Runner<F, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        paths: UpgradePaths,
        inventory: Inventory,
        statuses: StatusStore,
        validator: Validator<C>,
        cancel: CancelSet,
        factory: F,
        clock: C,
    ) -> Self {
        Self {
            settings,
            paths,
            inventory: Mutex::new(inventory),
            statuses,
            validator,
            cancel,
            factory,
            clock,
            refreshed: Mutex::new(HashSet::new()),
        }
    }

    /// Run one job to its terminal state and return the disposition for
    /// the job file.
    pub async fn run_job(&self, job: &Job) -> JobState {
        let outcome = match job.job_type {
            JobType::HaPair => self.upgrade_ha_pair(job).await,
            JobType::DownloadOnly => self.first_device_task(job, true).await,
            JobType::Standalone => self.first_device_task(job, job.download_only).await,
        };
        tracing::info!(job_id = %job.job_id, ?outcome, "job finished");
        outcome.job_state()
    }

    async fn first_device_task(&self, job: &Job, download_only: bool) -> TaskOutcome {
        let Some(serial) = job.devices.first() else {
            tracing::error!(job_id = %job.job_id, "job carries no devices");
            return TaskOutcome::Failed;
        };
        if download_only {
            self.download_only(serial, job).await
        } else {
            self.upgrade_device(serial, job).await
        }
    }

    /// Full upgrade of one standalone device.
    pub async fn upgrade_device(&self, serial: &str, job: &Job) -> TaskOutcome {
        self.upgrade_member(serial, job, HaRole::Standalone).await
    }

    /// Upgrade an HA pair: resolve one target for the pair, then upgrade
    /// the passive member first and the active member second.
    pub async fn upgrade_ha_pair(&self, job: &Job) -> TaskOutcome {
        let (Some(primary), Some(secondary)) = (
            job.devices.first().map(String::as_str),
            job.devices.get(1).map(String::as_str),
        ) else {
            tracing::error!(job_id = %job.job_id, "HA job does not carry two devices");
            return TaskOutcome::Failed;
        };
        tracing::info!(
            job_id = %job.job_id,
            primary,
            secondary,
            dry_run = job.dry_run,
            "starting HA pair upgrade"
        );

        let Some(primary_rec) = self.lookup_record(primary) else {
            tracing::error!(serial = primary, "HA member not found in inventory");
            return TaskOutcome::Failed;
        };
        let Some(secondary_rec) = self.lookup_record(secondary) else {
            tracing::error!(serial = secondary, "HA member not found in inventory");
            return TaskOutcome::Failed;
        };
        if primary_rec.mgmt_ip.is_empty() || secondary_rec.mgmt_ip.is_empty() {
            tracing::error!(primary, secondary, "HA member has no management address");
            return TaskOutcome::Failed;
        }

        let pair = match self.identify_pair(job, (primary, &primary_rec), (secondary, &secondary_rec)).await {
            Some(pair) => pair,
            None => return TaskOutcome::Failed,
        };

        let target = match self
            .paths
            .target_for(&pair.primary_version)
            .or_else(|| self.paths.target_for(&pair.secondary_version))
        {
            Some(target) => target.to_string(),
            None => {
                if pair.primary_version == pair.secondary_version {
                    tracing::info!(
                        version = %pair.primary_version,
                        "both HA members already at the same version, no upgrade path defined"
                    );
                    return TaskOutcome::Complete;
                }
                tracing::error!(
                    primary_version = %pair.primary_version,
                    secondary_version = %pair.secondary_version,
                    "no upgrade path for either HA member"
                );
                return TaskOutcome::Failed;
            }
        };
        tracing::info!(target = %target, "HA pair target version");

        let (passive, passive_version, active, active_version) = if pair.primary_role == HaRole::Passive {
            (primary, &pair.primary_version, secondary, &pair.secondary_version)
        } else if pair.secondary_role == HaRole::Passive {
            (secondary, &pair.secondary_version, primary, &pair.primary_version)
        } else {
            tracing::error!(
                primary_role = %pair.primary_role,
                secondary_role = %pair.secondary_role,
                "could not determine passive HA member"
            );
            return TaskOutcome::Failed;
        };

        if passive_version == &target {
            tracing::info!(serial = passive, %target, "passive member already at target, skipping");
        } else {
            tracing::info!(serial = passive, "upgrading passive member first");
            match self.upgrade_member(passive, job, HaRole::Passive).await {
                TaskOutcome::Complete => {}
                TaskOutcome::Cancelled => return TaskOutcome::Cancelled,
                outcome => {
                    tracing::error!(serial = passive, ?outcome, "passive member upgrade failed");
                    return TaskOutcome::Failed;
                }
            }
        }

        if self.cancelled(job, passive) || self.cancelled(job, active) {
            tracing::info!(job_id = %job.job_id, "HA pair upgrade cancelled between members");
            return TaskOutcome::Cancelled;
        }

        if active_version == &target {
            tracing::info!(serial = active, %target, "active member already at target, skipping");
        } else {
            tracing::info!(serial = active, "upgrading active member");
            match self.upgrade_member(active, job, HaRole::Active).await {
                TaskOutcome::Complete => {}
                TaskOutcome::Cancelled => return TaskOutcome::Cancelled,
                outcome => {
                    tracing::error!(serial = active, ?outcome, "active member upgrade failed");
                    return TaskOutcome::Failed;
                }
            }
        }

        TaskOutcome::Complete
    }

    /// Download and verify images without installing.
    pub async fn download_only(&self, serial: &str, job: &Job) -> TaskOutcome {
        tracing::info!(serial, job_id = %job.job_id, dry_run = job.dry_run, "starting download-only run");
        let mut status = self.load_or_init(serial);

        let Some(record) = self.lookup_record(serial) else {
            return self.fail_init(
                &mut status,
                format!("Device {serial} not found in inventory; run discovery first"),
            );
        };
        if record.mgmt_ip.is_empty() {
            return self.fail_init(&mut status, format!("No management address for device {serial}"));
        }
        status.hostname = display_hostname(&record, serial);

        let lookup_version = if status.starting_version.is_empty() {
            status.starting_version = record.current_version.clone();
            status.current_version = record.current_version.clone();
            record.current_version.clone()
        } else {
            tracing::info!(
                serial,
                starting_version = %status.starting_version,
                "resuming path lookup from starting version"
            );
            status.starting_version.clone()
        };

        let Some(path) = self.paths.path_for(&lookup_version).map(<[String]>::to_vec) else {
            return self.skip_no_path(&mut status, &lookup_version);
        };
        status.upgrade_path = path.clone();
        status.target_version = path.last().cloned().unwrap_or_default();
        status.set_message(format!("Preparing to download {} version(s)", path.len()), self.now());
        self.persist(&status);

        let client = self.factory.client(&record.mgmt_ip);

        self.refresh_once(&mut status, &client, job).await;

        status.set_message("Checking existing software on device", self.now());
        self.persist(&status);
        if !job.dry_run {
            let images = match client
                .software_info(self.settings.firewall.software_info_timeout())
                .await
            {
                Ok(images) => images,
                Err(e) => {
                    status.fail(
                        UpgradePhase::Download,
                        format!("Could not read software list: {e}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(&status);
                    return TaskOutcome::Failed;
                }
            };
            let downloaded: HashSet<&str> = images
                .iter()
                .filter(|i| i.downloaded)
                .map(|i| i.version.as_str())
                .collect();
            for version in &path {
                if downloaded.contains(version.as_str())
                    && !status.skipped_versions.contains(version)
                {
                    tracing::info!(serial, version = %version, "version already downloaded");
                    status.skipped_versions.push(version.clone());
                }
            }
            if path.iter().all(|v| downloaded.contains(v.as_str())) {
                let skipped = status.skipped_versions.join(", ");
                status.download_complete(
                    format!(
                        "All {} version(s) already downloaded: {skipped}",
                        status.skipped_versions.len()
                    ),
                    self.now(),
                );
                self.persist(&status);
                tracing::info!(serial, "download complete, all versions already present");
                return TaskOutcome::DownloadComplete;
            }

            status.begin_phase(
                UpgradePhase::PreFlight,
                UpgradeStatus::Validating,
                8,
                "Checking available disk space",
                self.now(),
            );
            self.persist(&status);
            match client.disk_space().await {
                Ok(available_gb) => {
                    let required_gb = self.settings.validation.min_disk_gb;
                    status.disk_space = Some(DiskSpace {
                        available_gb,
                        required_gb,
                        check_passed: available_gb >= required_gb,
                    });
                    if available_gb < required_gb {
                        status.fail(
                            UpgradePhase::PreFlight,
                            format!(
                                "Insufficient disk space: {available_gb:.2} GB available, {required_gb:.2} GB required"
                            ),
                            String::new(),
                            self.now(),
                        );
                        self.persist(&status);
                        return TaskOutcome::Failed;
                    }
                }
                Err(e) => {
                    status.fail(
                        UpgradePhase::PreFlight,
                        format!("Could not check disk space: {e}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(&status);
                    return TaskOutcome::Failed;
                }
            }
        }

        status.begin_phase(
            UpgradePhase::Download,
            UpgradeStatus::Downloading,
            DOWNLOAD_ONLY_BAND.base as u8,
            format!("Preparing to download {} image(s)", path.len()),
            self.now(),
        );
        self.persist(&status);
        if let Err(outcome) = self.download_all(&mut status, &client, job, DOWNLOAD_ONLY_BAND).await {
            return outcome;
        }

        status.begin_phase(
            UpgradePhase::Verify,
            UpgradeStatus::Downloading,
            90,
            "Verifying all images are downloaded...",
            self.now(),
        );
        self.persist(&status);
        if !job.dry_run {
            if let Err(outcome) = self.verify_images(&mut status, &client).await {
                return outcome;
            }
        }

        let downloaded = status.downloaded_versions.len();
        let skipped = status.skipped_versions.len();
        let message = if downloaded > 0 && skipped > 0 {
            format!(
                "Downloaded {downloaded} version(s): {}. Skipped {skipped} (already present): {}",
                status.downloaded_versions.join(", "),
                status.skipped_versions.join(", ")
            )
        } else if downloaded > 0 {
            format!("Downloaded {downloaded} version(s): {}", status.downloaded_versions.join(", "))
        } else {
            format!(
                "All {skipped} version(s) already downloaded: {}",
                status.skipped_versions.join(", ")
            )
        };
        status.download_complete(message, self.now());
        self.persist(&status);
        tracing::info!(serial, downloaded, skipped, "download-only run complete");
        TaskOutcome::DownloadComplete
    }

    /// The standalone flow, parameterized by HA role for pair members.
    async fn upgrade_member(&self, serial: &str, job: &Job, role: HaRole) -> TaskOutcome {
        tracing::info!(serial, job_id = %job.job_id, dry_run = job.dry_run, "starting device upgrade");
        let mut status = self.load_or_init(serial);
        status.ha_role = role;

        let Some(record) = self.lookup_record(serial) else {
            return self.fail_init(
                &mut status,
                format!("Device {serial} not found in inventory; run discovery first"),
            );
        };
        if record.mgmt_ip.is_empty() {
            return self.fail_init(&mut status, format!("No management address for device {serial}"));
        }
        let client = self.factory.client(&record.mgmt_ip);

        let live_version = if job.dry_run {
            status.hostname = display_hostname(&record, serial);
            record.current_version.clone()
        } else {
            match client.system_info().await {
                Ok(info) => {
                    status.hostname = info.hostname;
                    info.sw_version
                }
                Err(e) => {
                    return self.fail_init(
                        &mut status,
                        format!("Could not identify device {serial}: {e}"),
                    )
                }
            }
        };
        status.current_version = live_version.clone();

        let lookup_version = if status.starting_version.is_empty() {
            status.starting_version = live_version.clone();
            live_version.clone()
        } else {
            tracing::info!(
                serial,
                starting_version = %status.starting_version,
                live_version = %live_version,
                "resuming path lookup from starting version"
            );
            status.starting_version.clone()
        };

        let Some(path) = self.paths.path_for(&lookup_version).map(<[String]>::to_vec) else {
            return self.skip_no_path(&mut status, &lookup_version);
        };
        status.upgrade_path = path.clone();
        status.target_version = path.last().cloned().unwrap_or_default();

        if live_version == status.target_version {
            status.complete(format!("Device already at target version {live_version}"), self.now());
            self.persist(&status);
            tracing::info!(serial, version = %live_version, "device already at target");
            return TaskOutcome::Complete;
        }
        if let Some(idx) = path.iter().position(|v| v == &live_version) {
            status.current_path_index = idx + 1;
            tracing::info!(serial, index = idx + 1, "device already part-way along the path");
        }
        self.persist(&status);

        self.execute_path(&mut status, &client, job).await
    }

    /// Phases: pre-flight → refresh → download-all → verify-all →
    /// install-final → reboot → stabilize → post-flight → finalize.
    async fn execute_path(
        &self,
        status: &mut DeviceStatus,
        client: &Arc<dyn DeviceClient>,
        job: &Job,
    ) -> TaskOutcome {
        let serial = status.serial.clone();
        let final_version = status.target_version.clone();

        if self.cancelled(job, &serial) {
            return self.cancel_now(status, "Upgrade cancelled by admin");
        }

        // Pre-flight.
        status.begin_phase(
            UpgradePhase::PreFlight,
            UpgradeStatus::Validating,
            5,
            "Running pre-flight validation",
            self.now(),
        );
        self.persist(status);
        if job.dry_run {
            tracing::info!(serial, "[dry run] would run pre-flight validation");
            tokio::time::sleep(DRY_RUN_PAUSE).await;
        } else {
            match self.validator.pre_flight(&serial, client.as_ref()).await {
                Ok(metrics) => {
                    status.disk_space = Some(DiskSpace {
                        available_gb: metrics.disk_available_gb,
                        required_gb: self.settings.validation.min_disk_gb,
                        check_passed: true,
                    });
                }
                Err(PreFlightError::InsufficientDisk { available_gb, required_gb }) => {
                    status.disk_space =
                        Some(DiskSpace { available_gb, required_gb, check_passed: false });
                    status.fail(
                        UpgradePhase::PreFlight,
                        format!(
                            "Insufficient disk space: {available_gb:.2} GB available, {required_gb:.2} GB required"
                        ),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                Err(e) => {
                    status.fail(UpgradePhase::PreFlight, e.to_string(), String::new(), self.now());
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
            }
        }

        self.refresh_once(status, client, job).await;

        // Download every image on the path.
        status.begin_phase(
            UpgradePhase::Download,
            UpgradeStatus::Downloading,
            UPGRADE_DOWNLOAD_BAND.base as u8,
            format!("Preparing to download {} image(s)", status.upgrade_path.len()),
            self.now(),
        );
        self.persist(status);
        if let Err(outcome) = self.download_all(status, client, job, UPGRADE_DOWNLOAD_BAND).await {
            return outcome;
        }

        // Verify every image is present. Hard gate: the device's own
        // intermediate-step logic needs all of them on disk.
        status.begin_phase(
            UpgradePhase::Verify,
            UpgradeStatus::Downloading,
            55,
            "Verifying all images are downloaded...",
            self.now(),
        );
        self.persist(status);
        if !job.dry_run {
            if let Err(outcome) = self.verify_images(status, client).await {
                return outcome;
            }
        }

        if self.cancelled(job, &serial) {
            return self.cancel_now(status, "Upgrade cancelled by admin");
        }

        // Install only the final version; the device handles the
        // intermediate transitions itself.
        status.begin_phase(
            UpgradePhase::Install,
            UpgradeStatus::Installing,
            60,
            format!("Installing final version {final_version}"),
            self.now(),
        );
        self.persist(status);
        if job.dry_run {
            tracing::info!(serial, version = %final_version, "[dry run] would install final version");
            tokio::time::sleep(DRY_RUN_PAUSE).await;
        } else {
            let install_job = match client.install_start(&final_version).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    status.fail(
                        UpgradePhase::Install,
                        format!("Failed to initiate installation of {final_version}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                Err(e) => {
                    status.fail(
                        UpgradePhase::Install,
                        format!("Failed to initiate installation of {final_version}: {e}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
            };
            status.set_message(format!("Installing {final_version} (job {install_job})..."), self.now());
            self.persist(status);

            let opts = PollOpts {
                interval: self.settings.jobs.poll_interval(),
                stall_timeout: self.settings.jobs.stall_timeout(),
                overall_timeout: self.settings.firewall.upgrade_timeout(),
            };
            let outcome = wait_for_job(
                client.as_ref(),
                &install_job,
                opts,
                &self.clock,
                || self.cancel.is_cancelled(&job.job_id, &serial),
                |p| {
                    let progress = 60 + usize::from(p) * 15 / 100;
                    status.update_progress(
                        progress as u8,
                        format!("Installing {final_version}: {p}%"),
                        self.clock.utc_now(),
                    );
                    self.persist(status);
                },
            )
            .await;
            match outcome {
                PollOutcome::Success => {}
                PollOutcome::Failed { details } => {
                    status.fail(
                        UpgradePhase::Install,
                        format!("Installation of {final_version} failed: {details}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                PollOutcome::Stalled { last_progress } => {
                    status.fail(
                        UpgradePhase::Install,
                        format!("Installation of {final_version} stalled at {last_progress}%"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                PollOutcome::TimedOut { last_progress } => {
                    status.fail(
                        UpgradePhase::Install,
                        format!("Installation of {final_version} timed out at {last_progress}%"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                PollOutcome::Cancelled => {
                    return self.cancel_now(status, "Upgrade cancelled by admin")
                }
            }
        }

        // Reboot to activate the installed version.
        status.begin_phase(
            UpgradePhase::Reboot,
            UpgradeStatus::Rebooting,
            75,
            format!("Rebooting device to activate version {final_version}"),
            self.now(),
        );
        self.persist(status);
        if job.dry_run {
            tracing::info!(serial, "[dry run] would reboot device");
            tokio::time::sleep(DRY_RUN_PAUSE).await;
        } else {
            match client.reboot_start().await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    status.fail(
                        UpgradePhase::Reboot,
                        "Failed to initiate reboot".to_string(),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
            }

            // The device must first go down; polling too early reads the
            // old software as "ready".
            let initial = self.settings.reboot.initial_delay();
            status.set_message(
                format!("Reboot initiated, waiting {}s for shutdown...", initial.as_secs()),
                self.now(),
            );
            self.persist(status);
            tokio::time::sleep(initial).await;

            status.set_message("Waiting for device to come back online after reboot", self.now());
            self.persist(status);
            let max_interval = self.settings.firewall.max_reboot_poll_interval();
            let opts = ReadyOpts {
                timeout: self.settings.reboot.ready_timeout(),
                initial_interval: Duration::from_secs(15).min(max_interval),
                max_interval,
            };
            match march_client::wait_ready(client.as_ref(), opts, &self.clock, || {
                self.cancel.is_cancelled(&job.job_id, &serial)
            })
            .await
            {
                ReadyOutcome::Ready => {}
                ReadyOutcome::TimedOut => {
                    status.fail(
                        UpgradePhase::Reboot,
                        "Device did not come back online after reboot".to_string(),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return TaskOutcome::Failed;
                }
                ReadyOutcome::Cancelled => {
                    return self.cancel_now(status, "Upgrade cancelled by admin")
                }
            }

            let stabilization = self.settings.reboot.stabilization_delay();
            status.set_message(
                format!("Device is back online, stabilizing ({}s)...", stabilization.as_secs()),
                self.now(),
            );
            self.persist(status);
            tokio::time::sleep(stabilization).await;
        }

        // Post-flight. Never fatal: the device is up and serving.
        status.begin_phase(
            UpgradePhase::PostFlight,
            UpgradeStatus::Rebooting,
            90,
            format!("Running post-flight validation for version {final_version}"),
            self.now(),
        );
        self.persist(status);
        if job.dry_run {
            tracing::info!(serial, "[dry run] would run post-flight validation");
        } else {
            match self.validator.post_flight(&serial, client.as_ref()).await {
                PostFlight::Compared(report) if !report.validation_passed => {
                    status.record_error(
                        UpgradePhase::PostFlight,
                        "Post-flight metrics diverged from pre-flight baseline".to_string(),
                        String::new(),
                        self.now(),
                    );
                }
                PostFlight::Compared(_) => {}
                PostFlight::NoBaseline => {
                    tracing::warn!(serial, "post-flight skipped, no baseline snapshot");
                }
                PostFlight::Unreachable { attempts, last } => {
                    status.record_error(
                        UpgradePhase::PostFlight,
                        format!("Post-flight metrics unreachable after {attempts} attempts"),
                        last.to_string(),
                        self.now(),
                    );
                }
            }
        }

        status.current_version = final_version.clone();
        status.complete(format!("Successfully upgraded to version {final_version}"), self.now());
        self.persist(status);
        tracing::info!(serial, version = %final_version, "upgrade complete");
        TaskOutcome::Complete
    }

    /// Download every version on the path, skipping images already on the
    /// device and retrying each download up to the configured attempts.
    async fn download_all(
        &self,
        status: &mut DeviceStatus,
        client: &Arc<dyn DeviceClient>,
        job: &Job,
        band: Band,
    ) -> Result<(), TaskOutcome> {
        let serial = status.serial.clone();
        let path = status.upgrade_path.clone();
        let total = path.len().max(1);
        let attempts = self.settings.jobs.download_retry_attempts.max(1);

        for (idx, version) in path.iter().enumerate() {
            if self.cancelled(job, &serial) {
                return Err(self.cancel_now(status, "Upgrade cancelled by admin"));
            }

            status.current_path_index = idx;
            let base = band.base + idx * band.span / total;
            status.update_progress(
                base as u8,
                format!("Processing image {}/{}: {version}", idx + 1, path.len()),
                self.now(),
            );
            self.persist(status);

            if job.dry_run {
                tracing::info!(serial, version = %version, "[dry run] would download version");
                status.set_message(format!("[DRY RUN] Would download version {version}"), self.now());
                if !status.downloaded_versions.contains(version) {
                    status.downloaded_versions.push(version.clone());
                }
                self.persist(status);
                tokio::time::sleep(DRY_RUN_PAUSE).await;
                continue;
            }

            // Skip versions the device already holds.
            let images = match client
                .software_info(self.settings.firewall.software_info_timeout())
                .await
            {
                Ok(images) => images,
                Err(e) => {
                    status.fail(
                        UpgradePhase::Download,
                        format!("Could not read software list: {e}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return Err(TaskOutcome::Failed);
                }
            };
            if images.iter().any(|i| &i.version == version && i.downloaded) {
                tracing::info!(serial, version = %version, "version already downloaded, skipping");
                if !status.skipped_versions.contains(version) {
                    status.skipped_versions.push(version.clone());
                }
                status.set_message(format!("Version {version} already downloaded"), self.now());
                self.persist(status);
                continue;
            }

            // Disk is re-checked before every download; earlier images may
            // have consumed the headroom pre-flight saw.
            let required_gb = self.settings.validation.min_disk_gb;
            match client.disk_space().await {
                Ok(available_gb) => {
                    status.disk_space = Some(DiskSpace {
                        available_gb,
                        required_gb,
                        check_passed: available_gb >= required_gb,
                    });
                    if available_gb < required_gb {
                        status.fail(
                            UpgradePhase::Download,
                            format!(
                                "Insufficient disk space before downloading {version}: {available_gb:.2} GB available, {required_gb:.2} GB required"
                            ),
                            String::new(),
                            self.now(),
                        );
                        self.persist(status);
                        return Err(TaskOutcome::Failed);
                    }
                }
                Err(e) => {
                    status.fail(
                        UpgradePhase::Download,
                        format!("Could not check disk space before downloading {version}: {e}"),
                        String::new(),
                        self.now(),
                    );
                    self.persist(status);
                    return Err(TaskOutcome::Failed);
                }
            }

            let mut downloaded = false;
            let mut last_error = String::new();
            for attempt in 1..=attempts {
                if attempt > 1 {
                    tracing::info!(serial, version = %version, attempt, attempts, "retrying download");
                    status.set_message(
                        format!("Retry {attempt}/{attempts}: Downloading {version}"),
                        self.now(),
                    );
                    self.persist(status);
                }
                status.set_message(
                    format!("Downloading {version} ({}/{})", idx + 1, path.len()),
                    self.now(),
                );
                self.persist(status);

                let download_job = match client.download_start(version).await {
                    Ok(Some(id)) => id,
                    Ok(None) => {
                        last_error = format!("Failed to initiate download of {version}");
                        tracing::warn!(serial, version = %version, attempt, "download refused");
                        continue;
                    }
                    Err(e) => {
                        last_error = format!("Failed to initiate download of {version}: {e}");
                        tracing::warn!(serial, version = %version, attempt, error = %e, "download start failed");
                        continue;
                    }
                };
                status.set_message(format!("Downloading {version} (job {download_job})..."), self.now());
                self.persist(status);

                let opts = PollOpts {
                    interval: self.settings.jobs.poll_interval(),
                    stall_timeout: self.settings.jobs.stall_timeout(),
                    overall_timeout: self.settings.firewall.download_timeout(),
                };
                let outcome = wait_for_job(
                    client.as_ref(),
                    &download_job,
                    opts,
                    &self.clock,
                    || self.cancel.is_cancelled(&job.job_id, &serial),
                    |p| {
                        let slice = band.span / total;
                        let progress = band.base + idx * slice + usize::from(p) * slice / 100;
                        status.update_progress(
                            progress as u8,
                            format!("Downloading {version}: {p}%"),
                            self.clock.utc_now(),
                        );
                        self.persist(status);
                    },
                )
                .await;

                match outcome {
                    PollOutcome::Success => {
                        if !status.downloaded_versions.contains(version) {
                            status.downloaded_versions.push(version.clone());
                        }
                        status.set_message(format!("Downloaded {version}"), self.now());
                        self.persist(status);
                        tracing::info!(serial, version = %version, "download finished");
                        downloaded = true;
                        break;
                    }
                    PollOutcome::Failed { details } => {
                        last_error = format!("Download of {version} failed: {details}");
                    }
                    PollOutcome::Stalled { last_progress } => {
                        last_error = format!("Download of {version} stalled at {last_progress}%");
                    }
                    PollOutcome::TimedOut { last_progress } => {
                        last_error = format!("Download of {version} timed out at {last_progress}%");
                    }
                    PollOutcome::Cancelled => {
                        return Err(self.cancel_now(status, "Upgrade cancelled by admin"));
                    }
                }
                tracing::warn!(serial, version = %version, attempt, attempts, error = %last_error, "download attempt failed");
            }

            if !downloaded {
                status.fail(
                    UpgradePhase::Download,
                    format!("{last_error} after {attempts} attempts"),
                    String::new(),
                    self.now(),
                );
                self.persist(status);
                return Err(TaskOutcome::Failed);
            }
        }

        tracing::info!(serial, images = path.len(), "all images downloaded or already present");
        Ok(())
    }

    /// Require every path version to be present on the device.
    async fn verify_images(
        &self,
        status: &mut DeviceStatus,
        client: &Arc<dyn DeviceClient>,
    ) -> Result<(), TaskOutcome> {
        let images = match client
            .software_info(self.settings.firewall.software_info_timeout())
            .await
        {
            Ok(images) => images,
            Err(e) => {
                status.fail(
                    UpgradePhase::Verify,
                    format!("Could not verify downloaded images: {e}"),
                    String::new(),
                    self.now(),
                );
                self.persist(status);
                return Err(TaskOutcome::Failed);
            }
        };
        let downloaded: HashSet<&str> = images
            .iter()
            .filter(|i| i.downloaded)
            .map(|i| i.version.as_str())
            .collect();
        let missing: Vec<String> = status
            .upgrade_path
            .iter()
            .filter(|v| !downloaded.contains(v.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            status.fail(
                UpgradePhase::Verify,
                format!("Image verification failed, missing: {}", missing.join(", ")),
                String::new(),
                self.now(),
            );
            self.persist(status);
            return Err(TaskOutcome::Failed);
        }
        tracing::info!(
            serial = %status.serial,
            images = status.upgrade_path.len(),
            "all images verified on device"
        );
        Ok(())
    }

    /// Ask the device to refresh its software list, once per serial per
    /// process. Failures are logged and ignored.
    async fn refresh_once(
        &self,
        status: &mut DeviceStatus,
        client: &Arc<dyn DeviceClient>,
        job: &Job,
    ) {
        {
            let mut refreshed = self.refreshed.lock();
            if refreshed.contains(&status.serial) {
                return;
            }
            refreshed.insert(status.serial.clone());
        }
        status.begin_phase(
            UpgradePhase::SoftwareCheck,
            UpgradeStatus::Validating,
            10,
            "Refreshing available software versions...",
            self.now(),
        );
        self.persist(status);

        if job.dry_run {
            tracing::info!(serial = %status.serial, "[dry run] would refresh software list");
            return;
        }
        match client
            .refresh_software_list(self.settings.firewall.software_check_timeout())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(serial = %status.serial, "software list refresh failed, continuing");
            }
            Err(e) => {
                tracing::warn!(serial = %status.serial, error = %e, "software list refresh errored, continuing");
            }
        }
    }

    async fn identify_pair(
        &self,
        job: &Job,
        (primary, primary_rec): (&str, &DeviceRecord),
        (secondary, secondary_rec): (&str, &DeviceRecord),
    ) -> Option<PairIdentity> {
        if job.dry_run {
            return Some(PairIdentity {
                primary_version: primary_rec.current_version.clone(),
                secondary_version: secondary_rec.current_version.clone(),
                primary_role: primary_rec.ha_role,
                secondary_role: secondary_rec.ha_role,
            });
        }

        let primary_client = self.factory.client(&primary_rec.mgmt_ip);
        let secondary_client = self.factory.client(&secondary_rec.mgmt_ip);

        let primary_info = match primary_client.system_info().await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(serial = primary, error = %e, "could not identify HA member");
                return None;
            }
        };
        let secondary_info = match secondary_client.system_info().await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(serial = secondary, error = %e, "could not identify HA member");
                return None;
            }
        };
        let primary_ha = match primary_client.ha_state().await {
            Ok(ha) => ha,
            Err(e) => {
                tracing::error!(serial = primary, error = %e, "could not read HA state");
                return None;
            }
        };
        let secondary_ha = match secondary_client.ha_state().await {
            Ok(ha) => ha,
            Err(e) => {
                tracing::error!(serial = secondary, error = %e, "could not read HA state");
                return None;
            }
        };
        tracing::info!(
            primary_version = %primary_info.sw_version,
            secondary_version = %secondary_info.sw_version,
            primary_state = %primary_ha.local_state,
            secondary_state = %secondary_ha.local_state,
            "HA pair identified"
        );
        Some(PairIdentity {
            primary_version: primary_info.sw_version,
            secondary_version: secondary_info.sw_version,
            primary_role: primary_ha.local_state,
            secondary_role: secondary_ha.local_state,
        })
    }

    fn load_or_init(&self, serial: &str) -> DeviceStatus {
        match self.statuses.load_resumable(serial) {
            Ok(Some(status)) => {
                tracing::info!(
                    serial,
                    starting_version = %status.starting_version,
                    status = %status.upgrade_status,
                    "resuming in-flight upgrade from persisted status"
                );
                status
            }
            Ok(None) => DeviceStatus::new(serial, self.now()),
            Err(e) => {
                tracing::warn!(serial, error = %e, "could not load existing status, starting fresh");
                DeviceStatus::new(serial, self.now())
            }
        }
    }

    fn lookup_record(&self, serial: &str) -> Option<DeviceRecord> {
        let mut inventory = self.inventory.lock();
        if let Err(e) = inventory.reload() {
            tracing::warn!(error = %e, "inventory reload failed, using cached snapshot");
        }
        inventory.get(serial).cloned()
    }

    fn cancelled(&self, job: &Job, serial: &str) -> bool {
        self.cancel.is_cancelled(&job.job_id, serial)
    }

    fn fail_init(&self, status: &mut DeviceStatus, message: String) -> TaskOutcome {
        tracing::error!(serial = %status.serial, %message, "upgrade failed during init");
        status.fail(UpgradePhase::Init, message, String::new(), self.now());
        self.persist(status);
        TaskOutcome::Failed
    }

    fn skip_no_path(&self, status: &mut DeviceStatus, version: &str) -> TaskOutcome {
        tracing::warn!(serial = %status.serial, version, "no upgrade path for version");
        status.skip(format!("No upgrade path for version {version}"), self.now());
        self.persist(status);
        TaskOutcome::Skipped
    }

    fn cancel_now(&self, status: &mut DeviceStatus, message: &str) -> TaskOutcome {
        tracing::info!(serial = %status.serial, "upgrade cancelled at checkpoint");
        status.cancel(message, self.now());
        self.persist(status);
        TaskOutcome::Cancelled
    }

    fn persist(&self, status: &DeviceStatus) {
        if let Err(e) = self.statuses.save_device(status) {
            tracing::error!(serial = %status.serial, error = %e, "failed to persist device status");
        }
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.utc_now()
    }
}

struct PairIdentity {
    primary_version: String,
    secondary_version: String,
    primary_role: HaRole,
    secondary_role: HaRole,
}

/// Hostname to record before the device itself has answered.
fn display_hostname(record: &DeviceRecord, serial: &str) -> String {
    if record.hostname.is_empty() {
        serial.to_string()
    } else {
        record.hostname.clone()
    }
}

#[cfg(test)]
#[path = "runner_tests/mod.rs"]
mod tests;
