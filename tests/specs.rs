// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario tests.
//!
//! Each test drives a complete upgrade scenario end to end: real work
//! directory on disk, real queue and status stores, fake devices behind
//! the client capability.

use chrono::Utc;
use march_client::{FakeDevice, FakeFactory, JobScript};
use march_core::{
    DeviceStatus, HaRole, Job, JobState, JobType, Settings, SystemClock, UpgradeStatus,
    ValidationMetrics,
};
use march_engine::{CancelSet, Runner, Validator};
use march_storage::{
    load_upgrade_paths, read_json, write_json, Inventory, JobQueue, StatusStore, ValidationStore,
    WorkDir,
};
use std::sync::Arc;
use std::time::Duration;

struct Fleet {
    _tmp: tempfile::TempDir,
    work: WorkDir,
    queue: JobQueue,
    statuses: StatusStore,
    cancel: CancelSet,
    factory: FakeFactory,
    runner: Arc<Runner<FakeFactory, SystemClock>>,
}

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.validation.retry_delay = 0;
    settings.reboot.initial_delay = 0;
    settings.reboot.stabilization_delay = 0;
    settings.reboot.ready_timeout = 0;
    settings.firewall.max_reboot_poll_interval = 0;
    settings.jobs.poll_interval = 0;
    settings
}

fn fleet(paths: &str, inventory: &str) -> Fleet {
    let tmp = tempfile::tempdir().unwrap();
    let work = WorkDir::new(tmp.path().join("work"));
    work.ensure().unwrap();
    std::fs::write(work.upgrade_paths_file(), paths).unwrap();
    std::fs::write(work.inventory_file(), inventory).unwrap();

    let settings = fast_settings();
    let queue = JobQueue::new(&work);
    let statuses = StatusStore::new(&work);
    let cancel = CancelSet::new();
    let factory = FakeFactory::new();
    let runner = Arc::new(Runner::new(
        settings.clone(),
        load_upgrade_paths(&work).unwrap(),
        Inventory::load(work.inventory_file()).unwrap(),
        statuses.clone(),
        Validator::new(ValidationStore::new(&work), settings.validation.clone(), SystemClock),
        cancel.clone(),
        factory.clone(),
        SystemClock,
    ));
    Fleet { _tmp: tmp, work, queue, statuses, cancel, factory, runner }
}

impl Fleet {
    fn add_device(&self, serial: &str, ip: &str, version: &str) -> FakeDevice {
        let device = FakeDevice::new(serial, version);
        self.factory.register(ip, device.clone());
        device
    }

    fn status_of(&self, serial: &str) -> DeviceStatus {
        self.statuses.load_device(serial).unwrap().unwrap()
    }

    /// Drop a job into pending and walk it through the queue by hand:
    /// activate, run, finish. The daemon's dispatcher does exactly this.
    async fn run_through_queue(&self, job: Job) -> JobState {
        let path = self.work.queue_pending().join(format!("{}.json", job.job_id));
        write_json(&path, &job).unwrap();
        let (_active, job) = self.queue.activate(&path, Utc::now()).unwrap();
        let state = self.runner.run_job(&job).await;
        self.queue.finish(&job.job_id, state, Utc::now()).unwrap();
        state
    }
}

fn inventory_one(serial: &str, ip: &str, version: &str) -> String {
    format!(
        r#"{{"devices": {{"{serial}": {{"hostname": "host-{serial}", "mgmt_ip": "{ip}", "current_version": "{version}"}}}}}}"#
    )
}

#[tokio::test]
async fn single_hop_upgrade() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    device.set_disk_gb(15.0);

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    let state = fleet.run_through_queue(job).await;
    assert_eq!(state, JobState::Complete);

    let status = fleet.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Complete);
    assert_eq!(status.current_version, "10.2.0");
    assert_eq!(status.progress, 100);
    assert_eq!(status.downloaded_versions, vec!["10.2.0"]);
    assert!(status.skipped_versions.is_empty());

    // Job file ended in exactly one terminal directory.
    assert!(fleet.work.queue_completed().join("job-1.json").exists());
    assert!(!fleet.work.queue_active().join("job-1.json").exists());
}

#[tokio::test]
async fn multi_hop_downloads_all_installs_final() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    assert_eq!(fleet.run_through_queue(job).await, JobState::Complete);

    let status = fleet.status_of("fw001");
    assert_eq!(status.downloaded_versions, vec!["10.2.0", "10.2.5", "11.0.0"]);
    assert_eq!(status.current_version, "11.0.0");

    // Three download jobs, exactly one install (of the final version),
    // one reboot.
    assert_eq!(device.count("download_start"), 3);
    assert_eq!(device.count("install_start"), 1);
    assert!(device.calls().contains(&"install_start:11.0.0".to_string()));
    assert_eq!(device.count("reboot_start"), 1);
}

#[tokio::test]
async fn multi_hop_missing_image_fails_verification() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    device.suppress_download_effect();

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    assert_eq!(fleet.run_through_queue(job).await, JobState::Failed);

    let status = fleet.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Failed);
    assert!(status.upgrade_message.contains("missing"), "{}", status.upgrade_message);
    assert_eq!(device.count("install_start"), 0);
}

#[tokio::test]
async fn resume_after_restart_continues_from_recorded_state() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );

    // Status as the crashed orchestrator left it: mid-download, one
    // image already fetched.
    let mut interrupted = DeviceStatus::new("fw001", Utc::now());
    interrupted.starting_version = "10.1.0".into();
    interrupted.upgrade_status = UpgradeStatus::Downloading;
    interrupted.upgrade_path = vec!["10.2.0".into(), "10.2.5".into(), "11.0.0".into()];
    interrupted.current_path_index = 1;
    interrupted.downloaded_versions = vec!["10.2.0".into()];
    fleet.statuses.save_device(&interrupted).unwrap();

    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    device.add_image("10.2.0", true);

    let job = Job::new("job-2", JobType::Standalone, vec!["fw001".into()], Utc::now());
    assert_eq!(fleet.run_through_queue(job).await, JobState::Complete);

    let status = fleet.status_of("fw001");
    assert_eq!(status.starting_version, "10.1.0");
    assert_eq!(status.current_version, "11.0.0");
    // The already-present image was not downloaded again.
    assert!(!device.calls().contains(&"download_start:10.2.0".to_string()));
    assert!(device.calls().contains(&"download_start:10.2.5".to_string()));
}

#[tokio::test]
async fn ha_pair_upgrades_passive_before_active() {
    let fleet = fleet(
        r#"{"10.1.0": ["11.0.0"]}"#,
        &format!(
            r#"{{"devices": {{
                "fw001": {{"hostname": "a", "mgmt_ip": "10.0.0.10", "current_version": "10.1.0", "ha_role": "active", "peer_serial": "fw002"}},
                "fw002": {{"hostname": "b", "mgmt_ip": "10.0.0.11", "current_version": "10.1.0", "ha_role": "passive", "peer_serial": "fw001"}}
            }}}}"#
        ),
    );
    let active = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    active.set_ha(HaRole::Active, HaRole::Passive, "fw002");
    let passive = fleet.add_device("fw002", "10.0.0.11", "10.1.0");
    passive.set_ha(HaRole::Passive, HaRole::Active, "fw001");

    let job = Job::new(
        "job-ha",
        JobType::HaPair,
        vec!["fw001".into(), "fw002".into()],
        Utc::now(),
    );
    assert_eq!(fleet.run_through_queue(job).await, JobState::Complete);

    assert_eq!(fleet.status_of("fw001").upgrade_status, UpgradeStatus::Complete);
    assert_eq!(fleet.status_of("fw002").upgrade_status, UpgradeStatus::Complete);

    // Ordering: the passive member finished its reboot before the active
    // member's install began.
    let journal = fleet.factory.journal();
    let passive_reboot = journal.iter().position(|e| e == "fw002:reboot_start").unwrap();
    let active_install = journal
        .iter()
        .position(|e| e == "fw001:install_start:11.0.0")
        .unwrap();
    assert!(passive_reboot < active_install, "{journal:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_mid_download_moves_job_to_cancelled() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    // Second download wedges so the task is inside the poll loop when
    // the cancel lands.
    device.set_download_script_for("10.2.5", JobScript::StallAt { at: 30 });

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    let path = fleet.work.queue_pending().join("job-1.json");
    write_json(&path, &job).unwrap();
    let (_active, job) = fleet.queue.activate(&path, Utc::now()).unwrap();

    let runner = fleet.runner.clone();
    let task = tokio::spawn(async move { runner.run_job(&job).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    fleet.cancel.cancel_device("fw001");

    let state = task.await.unwrap();
    assert_eq!(state, JobState::Cancelled);
    fleet.queue.finish("job-1", state, Utc::now()).unwrap();

    assert!(fleet.work.queue_cancelled().join("job-1.json").exists());
    let status = fleet.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Cancelled);
    assert!(status.downloaded_versions.contains(&"10.2.0".to_string()));

    let stamped: Job = read_json(&fleet.work.queue_cancelled().join("job-1.json")).unwrap();
    assert_eq!(stamped.status, JobState::Cancelled);
}

#[tokio::test]
async fn insufficient_disk_fails_preflight_with_snapshot() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    device.set_disk_gb(2.0);
    device.set_metrics(ValidationMetrics { tcp_sessions: 500, ..Default::default() });

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    assert_eq!(fleet.run_through_queue(job).await, JobState::Failed);

    let status = fleet.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Failed);
    assert!(status.upgrade_message.contains("2.00"), "{}", status.upgrade_message);
    assert!(status.upgrade_message.contains("5.00"), "{}", status.upgrade_message);
    assert_eq!(device.count("download_start"), 0);

    // The pre-flight snapshot was persisted for forensics.
    let snapshots = std::fs::read_dir(fleet.work.validation_pre_dir())
        .unwrap()
        .count();
    assert_eq!(snapshots, 1);
}

#[tokio::test]
async fn device_serial_appears_in_at_most_one_nonterminal_job() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    fleet.add_device("fw001", "10.0.0.10", "10.1.0");

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    let path = fleet.work.queue_pending().join("job-1.json");
    write_json(&path, &job).unwrap();
    fleet.queue.activate(&path, Utc::now()).unwrap();

    // A second submission for the same serial is visible to the
    // submission-time check.
    assert!(fleet.queue.serial_in_flight("fw001", None).unwrap().is_some());
    assert!(fleet.queue.serial_active("fw001").unwrap().is_some());

    let state = fleet.runner.run_job(&fleet.queue.active_jobs().unwrap()[0].1.clone()).await;
    fleet.queue.finish("job-1", state, Utc::now()).unwrap();
    assert!(fleet.queue.serial_in_flight("fw001", None).unwrap().is_none());
}

#[tokio::test]
async fn download_only_job_stops_before_install() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0", "11.0.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");

    let job = Job::new("job-1", JobType::DownloadOnly, vec!["fw001".into()], Utc::now());
    assert_eq!(fleet.run_through_queue(job).await, JobState::Complete);

    let status = fleet.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::DownloadComplete);
    assert!(status.ready_for_install);
    assert_eq!(device.count("install_start"), 0);
    assert_eq!(device.count("reboot_start"), 0);
    assert_eq!(device.current_version(), "10.1.0");
}

#[tokio::test]
async fn persisted_entities_round_trip() {
    let fleet = fleet(
        r#"{"10.1.0": ["10.2.0"]}"#,
        &inventory_one("fw001", "10.0.0.10", "10.1.0"),
    );
    let device = fleet.add_device("fw001", "10.0.0.10", "10.1.0");
    device.set_disk_gb(15.0);

    let job = Job::new("job-1", JobType::Standalone, vec!["fw001".into()], Utc::now());
    fleet.run_through_queue(job).await;

    // Status file reads back as what the runner last wrote.
    let from_disk: DeviceStatus =
        read_json(&fleet.work.device_status_file("fw001")).unwrap();
    assert_eq!(from_disk.serial, "fw001");
    assert_eq!(from_disk.upgrade_status, UpgradeStatus::Complete);

    let job_from_disk: Job =
        read_json(&fleet.work.queue_completed().join("job-1.json")).unwrap();
    assert_eq!(job_from_disk.job_id, "job-1");
    assert!(job_from_disk.started_at.is_some());
    assert!(job_from_disk.completed_at.is_some());
}
