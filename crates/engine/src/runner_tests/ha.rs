// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use march_core::HaRole;

const PAIR_PATHS: &str = r#"{"10.1.0": ["11.0.0"]}"#;

fn pair_inventory() -> String {
    inventory_of(&[
        ("fw001", "10.0.0.10", "10.1.0", "active"),
        ("fw002", "10.0.0.11", "10.1.0", "passive"),
    ])
}

fn pair_job(job_id: &str) -> Job {
    Job::new(
        job_id,
        JobType::HaPair,
        vec!["fw001".to_string(), "fw002".to_string()],
        chrono::Utc::now(),
    )
}

/// Registers an active/passive pair; fw001 is active, fw002 passive.
fn register_pair(h: &Harness) -> (FakeDevice, FakeDevice) {
    let active = register_device(h, "10.0.0.10", "fw001", "10.1.0");
    active.set_ha(HaRole::Active, HaRole::Passive, "fw002");
    let passive = register_device(h, "10.0.0.11", "fw002", "10.1.0");
    passive.set_ha(HaRole::Passive, HaRole::Active, "fw001");
    (active, passive)
}

#[tokio::test]
async fn passive_member_upgrades_before_active() {
    let h = harness(PAIR_PATHS, &pair_inventory());
    let (active, passive) = register_pair(&h);

    let outcome = h.runner.upgrade_ha_pair(&pair_job("job-ha")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    assert_eq!(active.current_version(), "11.0.0");
    assert_eq!(passive.current_version(), "11.0.0");
    assert_eq!(h.status_of("fw001").upgrade_status, UpgradeStatus::Complete);
    assert_eq!(h.status_of("fw002").upgrade_status, UpgradeStatus::Complete);
    assert_eq!(h.status_of("fw002").ha_role, HaRole::Passive);
    assert_eq!(h.status_of("fw001").ha_role, HaRole::Active);

    // The passive member's reboot happens before the active member's
    // install even starts.
    let journal = h.factory.journal();
    let passive_reboot = journal.iter().position(|e| e == "fw002:reboot_start").unwrap();
    let active_install = journal.iter().position(|e| e == "fw001:install_start:11.0.0").unwrap();
    assert!(passive_reboot < active_install, "{journal:?}");
}

#[tokio::test]
async fn failed_passive_member_stops_the_pair() {
    let h = harness(PAIR_PATHS, &pair_inventory());
    let (active, passive) = register_pair(&h);
    passive.set_install_script(JobScript::FailAt { at: 20, details: "no space".into() });

    let outcome = h.runner.upgrade_ha_pair(&pair_job("job-ha")).await;
    assert_eq!(outcome, TaskOutcome::Failed);

    // The active member was identified but never driven.
    assert_eq!(active.count("install_start"), 0);
    assert_eq!(active.count("download_start"), 0);
}

#[tokio::test]
async fn member_already_at_target_is_left_alone() {
    let h = harness(
        PAIR_PATHS,
        &inventory_of(&[
            ("fw001", "10.0.0.10", "10.1.0", "active"),
            ("fw002", "10.0.0.11", "11.0.0", "passive"),
        ]),
    );
    let active = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    active.set_ha(HaRole::Active, HaRole::Passive, "fw002");
    let passive = register_device(&h, "10.0.0.11", "fw002", "11.0.0");
    passive.set_ha(HaRole::Passive, HaRole::Active, "fw001");

    let outcome = h.runner.upgrade_ha_pair(&pair_job("job-ha")).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    assert_eq!(passive.count("download_start"), 0);
    assert_eq!(passive.count("reboot_start"), 0);
    assert_eq!(active.current_version(), "11.0.0");
}

#[tokio::test]
async fn both_at_same_version_without_path_is_trivially_complete() {
    let h = harness(
        r#"{}"#,
        &inventory_of(&[
            ("fw001", "10.0.0.10", "11.0.0", "active"),
            ("fw002", "10.0.0.11", "11.0.0", "passive"),
        ]),
    );
    let active = register_device(&h, "10.0.0.10", "fw001", "11.0.0");
    active.set_ha(HaRole::Active, HaRole::Passive, "fw002");
    let passive = register_device(&h, "10.0.0.11", "fw002", "11.0.0");
    passive.set_ha(HaRole::Passive, HaRole::Active, "fw001");

    assert_eq!(h.runner.upgrade_ha_pair(&pair_job("job-ha")).await, TaskOutcome::Complete);
}

#[tokio::test]
async fn version_skew_without_any_path_fails() {
    let h = harness(r#"{}"#, &pair_inventory());
    let active = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    active.set_ha(HaRole::Active, HaRole::Passive, "fw002");
    let passive = register_device(&h, "10.0.0.11", "fw002", "10.2.0");
    passive.set_ha(HaRole::Passive, HaRole::Active, "fw001");

    assert_eq!(h.runner.upgrade_ha_pair(&pair_job("job-ha")).await, TaskOutcome::Failed);
}

#[tokio::test]
async fn pair_without_a_passive_member_fails() {
    let h = harness(PAIR_PATHS, &pair_inventory());
    let first = register_device(&h, "10.0.0.10", "fw001", "10.1.0");
    first.set_ha(HaRole::Active, HaRole::Unknown, "fw002");
    let second = register_device(&h, "10.0.0.11", "fw002", "10.1.0");
    second.set_ha(HaRole::Unknown, HaRole::Active, "fw001");

    assert_eq!(h.runner.upgrade_ha_pair(&pair_job("job-ha")).await, TaskOutcome::Failed);
    // Neither member was upgraded on a guess.
    assert_eq!(first.count("download_start"), 0);
    assert_eq!(second.count("download_start"), 0);
}

#[tokio::test]
async fn member_missing_from_inventory_fails() {
    let h = harness(
        PAIR_PATHS,
        &inventory_of(&[("fw001", "10.0.0.10", "10.1.0", "active")]),
    );
    assert_eq!(h.runner.upgrade_ha_pair(&pair_job("job-ha")).await, TaskOutcome::Failed);
}

#[tokio::test]
async fn cancellation_between_members_stops_the_active_upgrade() {
    let h = harness(PAIR_PATHS, &pair_inventory());
    let (active, _passive) = register_pair(&h);
    // Cancel only the active member; the passive upgrade runs through.
    h.cancel.cancel_device("fw001");

    let outcome = h.runner.upgrade_ha_pair(&pair_job("job-ha")).await;
    assert_eq!(outcome, TaskOutcome::Cancelled);

    assert_eq!(h.status_of("fw002").upgrade_status, UpgradeStatus::Complete);
    assert_eq!(active.count("download_start"), 0);
}

#[tokio::test]
async fn dry_run_orders_members_from_inventory_roles() {
    let h = harness(PAIR_PATHS, &pair_inventory());
    let (active, passive) = register_pair(&h);

    let mut job = pair_job("job-ha");
    job.dry_run = true;
    let outcome = h.runner.upgrade_ha_pair(&job).await;
    assert_eq!(outcome, TaskOutcome::Complete);

    assert!(active.calls().is_empty());
    assert!(passive.calls().is_empty());
    assert_eq!(h.status_of("fw002").upgrade_status, UpgradeStatus::Complete);
    assert_eq!(h.status_of("fw001").upgrade_status, UpgradeStatus::Complete);
}
