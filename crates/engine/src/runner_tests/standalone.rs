// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const ONE_HOP: &str = r#"{"10.1.0": ["10.2.0"]}"#;
const THREE_HOP: &str = r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#;

fn one_device_inventory() -> String {
    inventory_of(&[("fw001", "10.0.0.10", "10.1.0", "standalone")])
}

#[tokio::test]
async fn single_hop_upgrade_walks_every_phase() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_disk_gb(15.0);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Complete);
    assert_eq!(status.current_version, "10.2.0");
    assert_eq!(status.starting_version, "10.1.0");
    assert_eq!(status.target_version, "10.2.0");
    assert_eq!(status.progress, 100);
    assert_eq!(status.downloaded_versions, vec!["10.2.0"]);
    assert!(status.skipped_versions.is_empty());
    assert!(status.errors.is_empty());

    // The device itself moved.
    assert_eq!(device.current_version(), "10.2.0");
    assert_eq!(device.count("reboot_start"), 1);
}

#[tokio::test]
async fn multi_hop_downloads_all_but_installs_only_final() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let status = h.status_of("fw001");
    assert_eq!(status.downloaded_versions, vec!["10.2.0", "10.2.5", "11.0.0"]);
    assert_eq!(status.current_version, "11.0.0");

    assert_eq!(device.count("download_start"), 3);
    assert_eq!(device.count("install_start"), 1);
    assert!(device.calls().contains(&"install_start:11.0.0".to_string()));
    assert_eq!(device.count("reboot_start"), 1);
}

#[tokio::test]
async fn missing_image_after_downloads_is_a_hard_gate() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    // Device acknowledges every download but never lands the images.
    device.suppress_download_effect();

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Failed);
    assert!(status.upgrade_message.contains("missing"), "{}", status.upgrade_message);
    assert!(status.upgrade_message.contains("10.2.5"), "{}", status.upgrade_message);
    // Nothing was installed behind the failed gate.
    assert_eq!(device.count("install_start"), 0);
}

#[tokio::test]
async fn insufficient_disk_fails_before_any_download() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_disk_gb(2.0);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Failed);
    assert!(status.upgrade_message.contains("2.00"), "{}", status.upgrade_message);
    assert!(status.upgrade_message.contains("5.00"), "{}", status.upgrade_message);
    assert_eq!(status.disk_space.unwrap().check_passed, false);
    assert_eq!(device.count("download_start"), 0);

    // The forensic snapshot was still written.
    let snapshots: Vec<_> = std::fs::read_dir(h.work.validation_pre_dir())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn unknown_version_is_skipped_with_reason() {
    let h = harness(ONE_HOP, &inventory_of(&[("fw001", "10.0.0.10", "9.0.0", "standalone")]));
    register_device(&h, "10.0.0.10", "fw001", "9.0.0");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Skipped);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Skipped);
    assert!(status.skip_reason.contains("9.0.0"));
}

#[tokio::test]
async fn device_missing_from_inventory_fails_in_init_phase() {
    let h = harness(ONE_HOP, &one_device_inventory());

    let outcome = h.runner.upgrade_device("fw999", &standalone_job("job-1", "fw999")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw999");
    assert_eq!(status.errors.len(), 1);
    assert_eq!(status.errors[0].phase, UpgradePhase::Init);
}

#[tokio::test]
async fn unreachable_device_fails_in_init_phase() {
    // Inventory knows the address but nothing answers there.
    let h = harness(ONE_HOP, &one_device_inventory());

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);
    assert_eq!(h.status_of("fw001").errors[0].phase, UpgradePhase::Init);
}

#[tokio::test]
async fn download_retries_then_succeeds() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.refuse_downloads(1);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);
    assert_eq!(device.count("download_start"), 2);
}

#[tokio::test]
async fn stalled_download_exhausts_retries_and_fails() {
    let mut settings = fast_settings();
    settings.jobs.stall_timeout = 0;
    settings.jobs.poll_interval = 0;
    let h = harness_with_settings(ONE_HOP, &one_device_inventory(), settings);
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_download_script(JobScript::StallAt { at: 40 });

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw001");
    assert!(status.upgrade_message.contains("stalled"), "{}", status.upgrade_message);
    assert!(status.upgrade_message.contains("after 3 attempts"), "{}", status.upgrade_message);
    assert_eq!(device.count("download_start"), 3);
}

#[tokio::test]
async fn failed_install_is_terminal() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_install_script(JobScript::FailAt { at: 30, details: "image rejected".into() });

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    let status = h.status_of("fw001");
    assert!(status.upgrade_message.contains("image rejected"), "{}", status.upgrade_message);
    assert!(status.errors.iter().any(|e| e.phase == UpgradePhase::Install));
    assert_eq!(device.count("reboot_start"), 0);
}

#[tokio::test]
async fn reboot_timeout_fails_the_upgrade() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_reboot_outage(u32::MAX);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Failed);
    assert!(h
        .status_of("fw001")
        .upgrade_message
        .contains("did not come back online"));
}

#[tokio::test]
async fn reboot_outage_then_recovery_completes() {
    let mut settings = fast_settings();
    settings.reboot.ready_timeout = 30;
    let h = harness_with_settings(ONE_HOP, &one_device_inventory(), settings);
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_reboot_outage(2);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);
    assert_eq!(device.current_version(), "10.2.0");
}

#[tokio::test]
async fn post_flight_divergence_is_recorded_but_not_fatal() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    // Session count collapses after the reboot, well outside the 5% margin.
    device.set_metrics_after_reboot(march_core::ValidationMetrics {
        tcp_sessions: 10,
        ..Default::default()
    });

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Complete);
    assert!(status.errors.iter().any(|e| e.phase == UpgradePhase::PostFlight));

    // The comparison report landed in the post-flight history.
    let reports: Vec<_> = std::fs::read_dir(h.work.validation_post_dir())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn dry_run_never_contacts_the_device() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let mut job = standalone_job("job-1", "fw001");
    job.dry_run = true;
    let outcome = h.runner.upgrade_device("fw001", &job).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    assert!(device.calls().is_empty(), "dry run called the device: {:?}", device.calls());
    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Complete);
    assert_eq!(status.progress, 100);
    assert_eq!(status.target_version, "11.0.0");
}

#[tokio::test]
async fn run_job_maps_outcomes_to_job_states() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.set_disk_gb(15.0);

    let state = h.runner.run_job(&standalone_job("job-1", "fw001")).await;
    assert_eq!(state, JobState::Complete);
}

#[tokio::test]
async fn run_job_with_no_devices_fails() {
    let h = harness(ONE_HOP, &one_device_inventory());
    let mut job = standalone_job("job-1", "fw001");
    job.devices.clear();
    assert_eq!(h.runner.run_job(&job).await, JobState::Failed);
}
