// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;

const THREE_HOP: &str = r#"{"10.1.0": ["10.2.0", "10.2.5", "11.0.0"]}"#;

fn one_device_inventory() -> String {
    inventory_of(&[("fw001", "10.0.0.10", "10.1.0", "standalone")])
}

/// Persist a mid-download status the way a crashed daemon would have
/// left it.
fn seed_interrupted_download(h: &Harness) {
    let mut status = DeviceStatus::new("fw001", Utc::now());
    status.starting_version = "10.1.0".into();
    status.upgrade_status = UpgradeStatus::Downloading;
    status.current_phase = Some(UpgradePhase::Download);
    status.upgrade_path = vec!["10.2.0".into(), "10.2.5".into(), "11.0.0".into()];
    status.current_path_index = 1;
    status.downloaded_versions = vec!["10.2.0".into()];
    status.progress = 30;
    h.statuses.save_device(&status).unwrap();
}

#[tokio::test]
async fn resume_reenters_download_with_same_starting_version() {
    let h = harness(THREE_HOP, &one_device_inventory());
    seed_interrupted_download(&h);
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    // The first image survived the crash on the device.
    device.add_image("10.2.0", true);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-2", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let status = h.status_of("fw001");
    assert_eq!(status.starting_version, "10.1.0");
    assert_eq!(
        status.upgrade_path,
        vec!["10.2.0".to_string(), "10.2.5".to_string(), "11.0.0".to_string()]
    );
    // 10.2.0 was found on the device and skipped, the rest downloaded.
    assert!(status.skipped_versions.contains(&"10.2.0".to_string()));
    assert!(status.downloaded_versions.contains(&"10.2.5".to_string()));
    assert!(status.downloaded_versions.contains(&"11.0.0".to_string()));
    assert!(!device.calls().contains(&"download_start:10.2.0".to_string()));
}

#[tokio::test]
async fn resume_after_reboot_finds_device_at_target() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let mut status = DeviceStatus::new("fw001", Utc::now());
    status.starting_version = "10.1.0".into();
    status.upgrade_status = UpgradeStatus::Rebooting;
    status.upgrade_path = vec!["10.2.0".into(), "10.2.5".into(), "11.0.0".into()];
    h.statuses.save_device(&status).unwrap();

    // The install and reboot finished before the crash.
    register_device(&h, "10.0.0.10", "fw001", "11.0.0");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-2", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let resumed = h.status_of("fw001");
    assert_eq!(resumed.upgrade_status, UpgradeStatus::Complete);
    assert_eq!(resumed.current_version, "11.0.0");
    assert_eq!(resumed.starting_version, "10.1.0");
}

#[tokio::test]
async fn live_version_already_on_path_skips_completed_hops() {
    let h = harness(THREE_HOP, &one_device_inventory());
    seed_interrupted_download(&h);
    // Device actually reached 10.2.0 before the crash.
    let device = register_device(&h, "10.0.0.10", "fw001", "10.2.0");
    device.add_image("10.2.0", true);

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-2", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    let status = h.status_of("fw001");
    // Path still resolved from the recorded starting version.
    assert_eq!(status.starting_version, "10.1.0");
    assert_eq!(status.current_version, "11.0.0");
}

#[tokio::test]
async fn terminal_status_is_not_resumed() {
    let h = harness(THREE_HOP, &one_device_inventory());
    let mut stale = DeviceStatus::new("fw001", Utc::now());
    stale.starting_version = "9.9.9".into();
    stale.upgrade_status = UpgradeStatus::Failed;
    h.statuses.save_device(&stale).unwrap();

    register_device(&h, "10.0.0.10", "fw001", "10.1.0");

    let outcome = h.runner.upgrade_device("fw001", &standalone_job("job-2", "fw001")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    // Fresh run anchored on the live version, not the stale record.
    assert_eq!(h.status_of("fw001").starting_version, "10.1.0");
}

#[tokio::test]
async fn progress_never_regresses_across_a_resume() {
    let h = harness(THREE_HOP, &one_device_inventory());
    seed_interrupted_download(&h);
    let device = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    device.add_image("10.2.0", true);

    h.runner.upgrade_device("fw001", &standalone_job("job-2", "fw001")).await;
    // The seeded record was at 30; nothing in the resumed run may have
    // written a smaller value, and the run ends at 100.
    assert_eq!(h.status_of("fw001").progress, 100);
}
