// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

const THREE_HOP: &str = r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#;

fn one_device_inventory() -> String {
    inventory_of(&[("fw001", "10.0.0.10", "10.1.0", "standalone")])
}

#[tokio::test]
async fn cancel_before_preflight_yields_cancelled_not_failed() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    h.cancel.cancel_job("job-1");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Cancelled);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Cancelled);
    assert!(status.errors.is_empty());
    assert_eq!(device.count("download_start"), 0);
}

#[tokio::test]
async fn cancel_by_device_serial_works_like_cancel_by_job() {
    let h = harness(THREE_HOP, &one_device_inventory());
    register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    h.cancel.cancel_device("fw001");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_mid_download_stops_at_the_next_checkpoint() {
    let mut settings = fast_settings();
    settings.jobs.poll_interval = 0;
    settings.jobs.stall_timeout = 600;
    let h = harness_with_settings(THREE_HOP, &one_device_inventory(), settings);
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    // The second image wedges mid-transfer, pinning the task inside the
    // poll loop until the cancel lands.
    device.set_download_script_for("10.2.5", JobScript::StallAt { at: 40 });

    let runner = h.runner.clone();
    let task = tokio::spawn(async move {
        runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await
    });

    // Let the first download finish, then cancel the device.
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.cancel.cancel_device("fw001");

    let outcome = task.await.unwrap();
    assert_eq!(outcome, TaskOutcome::Cancelled);

    let status = h.status_of("fw001");
    assert_eq!(status.upgrade_status, UpgradeStatus::Cancelled);
    assert!(status.downloaded_versions.contains(&"10.2.0".to_string()));
    // Install never started; the in-flight device job is simply no
    // longer observed.
    assert_eq!(device.count("install_start"), 0);
}

#[tokio::test]
async fn cancelled_status_is_frozen_afterwards() {
    let h = harness(THREE_HOP, &one_device_inventory());
    register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    h.cancel.cancel_job("job-1");
    h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;

    let before = h.status_of("fw001");
    // A stray rerun of the same cancelled job must not mutate the record.
    h.runner.upgrade_device("fw001", &standalone_job("job-1", "fw001")).await;
    let after = h.status_of("fw001");
    assert_eq!(before.upgrade_status, after.upgrade_status);
}
