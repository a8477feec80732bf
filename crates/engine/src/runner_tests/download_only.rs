// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const TWO_HOP: &str = r#"{"10.1.0": ["10.2.0", "11.0.0"]}"#;

fn one_device_inventory() -> String {
    inventory_of(&[("fw001", "10.0.0.10", "10.1.0", "standalone")])
}

fn download_job(job_id: &str) -> Job {
    Job::new(job_id, JobType::DownloadOnly, vec!["fw001".to_string()], chrono::Utc::now())
}

#[tokio::test]
async fn downloads_and_verifies_without_installing() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let outcome = h.runner.download_only("fw001", &download_job("job-1")).await;
    assert_eq!(outcome, TaskOutcome::DownloadComplete);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::DownloadComplete);
    assert!(status.ready_for_install);
    assert_eq!(status.progress, 100);
    assert_eq!(status.downloaded_versions, vec!["10.2.0", "11.0.0"]);
    assert_eq!(status.starting_version, "10.1.0");

    // Images landed, nothing was activated.
    assert!(device.image("10.2.0").unwrap().downloaded);
    assert!(device.image("11.0.0").unwrap().downloaded);
    assert_eq!(device.count("install_start"), 0);
    assert_eq!(device.count("reboot_start"), 0);
    assert_eq!(device.current_version(), "10.1.0");
}

#[tokio::test]
async fn all_images_already_present_short_circuits() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.add_image("10.2.0", true);
    device.add_image("11.0.0", true);

    let outcome = h.runner.download_only("fw001", &download_job("job-1")).await;
    assert_eq!(outcome, TaskOutcome::DownloadComplete);

    let status = h.status_of("fw001");
    assert_eq!(status.skipped_versions, vec!["10.2.0", "11.0.0"]);
    assert!(status.downloaded_versions.is_empty());
    assert!(status.upgrade_message.contains("already downloaded"), "{}", status.upgrade_message);
    // No disk check needed when there is nothing to download.
    assert_eq!(device.count("disk_space"), 0);
    assert_eq!(device.count("download_start"), 0);
}

#[tokio::test]
async fn mixed_present_and_missing_images_reports_both() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.add_image("10.2.0", true);

    let outcome = h.runner.download_only("fw001", &download_job("job-1")).await;
    assert_eq!(outcome, TaskOutcome::DownloadComplete);

    let status = h.status_of("fw001");
    assert_eq!(status.skipped_versions, vec!["10.2.0"]);
    assert_eq!(status.downloaded_versions, vec!["11.0.0"]);
    assert!(status.upgrade_message.contains("Downloaded 1"), "{}", status.upgrade_message);
    assert!(status.upgrade_message.contains("Skipped 1"), "{}", status.upgrade_message);
}

#[tokio::test]
async fn insufficient_disk_fails_the_run() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_disk_gb(1.0);

    let outcome = h.runner.download_only("fw001", &download_job("job-1")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Failed);
    assert!(status.upgrade_message.contains("1.00"), "{}", status.upgrade_message);
    assert_eq!(device.count("download_start"), 0);
}

#[tokio::test]
async fn unknown_version_is_skipped() {
    let h = harness(TWO_HOP, &inventory_of(&[("fw001", "10.0.0.10", "8.1.0", "standalone")]));
    register_device(&h, "10.0.0.10", "fw001", "8.1.0");

    let outcome = h.runner.download_only("fw001", &download_job("job-1")).await;
    assert_eq!(outcome, TaskOutcome::Skipped);
    assert_eq!(h.status_of("fw001").upgrade_status, UpgradeStatus::Skipped);
}

#[tokio::test]
async fn standalone_job_with_download_only_flag_routes_here() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let mut job = standalone_job("job-1", "fw001");
    job.download_only = true;
    let state = h.runner.run_job(&job).await;
    assert_eq!(state, JobState::Complete);
    assert_eq!(h.status_of("fw001").upgrade_status, UpgradeStatus::DownloadComplete);
    assert_eq!(device.count("install_start"), 0);
}

#[tokio::test]
async fn dry_run_walks_the_flow_without_device_contact() {
    let h = harness(TWO_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let mut job = download_job("job-1");
    job.dry_run = true;
    let outcome = h.runner.download_only("fw001", &job).await;
    assert_eq!(outcome, TaskOutcome::DownloadComplete);
    assert!(device.calls().is_empty());
    assert!(h.status_of("fw001").ready_for_install);
}
