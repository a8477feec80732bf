// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

fn metrics(sessions: u64) -> ValidationMetrics {
    ValidationMetrics { tcp_sessions: sessions, ..ValidationMetrics::default() }
}

fn setup() -> (tempfile::TempDir, ValidationStore) {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path().join("work"));
    work.ensure().unwrap();
    (dir, ValidationStore::new(&work))
}

#[test]
fn pre_flight_snapshot_filename_carries_compact_timestamp() {
    let (_dir, store) = setup();
    let path = store
        .save_pre_flight("fw001", &metrics(10), ts("2026-03-01T12:34:56Z"))
        .unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "fw001_20260301_123456.json"
    );
}

#[test]
fn latest_pre_flight_picks_newest_snapshot() {
    let (_dir, store) = setup();
    store.save_pre_flight("fw001", &metrics(100), ts("2026-03-01T10:00:00Z")).unwrap();
    store.save_pre_flight("fw001", &metrics(200), ts("2026-03-01T11:00:00Z")).unwrap();
    store.save_pre_flight("fw001", &metrics(150), ts("2026-03-01T10:30:00Z")).unwrap();

    let latest = store.latest_pre_flight("fw001").unwrap().unwrap();
    assert_eq!(latest.tcp_sessions, 200);
}

#[test]
fn latest_pre_flight_is_scoped_per_serial() {
    let (_dir, store) = setup();
    store.save_pre_flight("fw001", &metrics(1), ts("2026-03-01T10:00:00Z")).unwrap();
    store.save_pre_flight("fw002", &metrics(2), ts("2026-03-01T11:00:00Z")).unwrap();

    assert_eq!(store.latest_pre_flight("fw001").unwrap().unwrap().tcp_sessions, 1);
    assert!(store.latest_pre_flight("fw404").unwrap().is_none());
}

#[test]
fn serial_prefix_does_not_collide() {
    let (_dir, store) = setup();
    store.save_pre_flight("fw1_lab", &metrics(99), ts("2026-03-01T10:00:00Z")).unwrap();
    assert!(store.latest_pre_flight("fw1").unwrap().is_none());
}

#[parameterized(
    exact = { "fw001_20260301_123456.json", true },
    wrong_serial = { "fw002_20260301_123456.json", false },
    nested_serial = { "fw001_lab_20260301_123456.json", false },
    no_extension = { "fw001_20260301_123456", false },
    short_stamp = { "fw001_2026_1234.json", false },
    letters_in_stamp = { "fw001_2026030x_123456.json", false },
)]
fn snapshot_name_matching(name: &str, matches: bool) {
    assert_eq!(is_snapshot_of(name, "fw001_"), matches);
}

#[test]
fn post_flight_report_round_trips() {
    let (_dir, store) = setup();
    let report = ValidationReport {
        serial: "fw001".into(),
        timestamp: "2026-03-01T12:00:00Z".into(),
        pre_flight: metrics(10),
        post_flight: Some(metrics(11)),
        comparison: Default::default(),
        validation_passed: true,
    };
    let path = store.save_post_flight("fw001", &report, ts("2026-03-01T12:00:00Z")).unwrap();
    let back: ValidationReport = read_json(&path).unwrap();
    assert!(back.validation_passed);
    assert_eq!(back.post_flight.unwrap().tcp_sessions, 11);
}
