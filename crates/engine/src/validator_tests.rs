// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use march_client::FakeDevice;
use march_core::{ArpEntry, RouteEntry, SystemClock};
use march_storage::WorkDir;

fn fast_settings() -> ValidationSettings {
    ValidationSettings { retry_delay: 0, ..ValidationSettings::default() }
}

fn setup(settings: ValidationSettings) -> (tempfile::TempDir, ValidationStore, Validator<SystemClock>) {
    let dir = tempfile::tempdir().unwrap();
    let work = WorkDir::new(dir.path().join("work"));
    work.ensure().unwrap();
    let store = ValidationStore::new(&work);
    let validator = Validator::new(ValidationStore::new(&work), settings, SystemClock);
    (dir, store, validator)
}

fn route(dst: &str) -> RouteEntry {
    RouteEntry { destination: dst.into(), gateway: "10.0.0.1".into(), interface: "eth1".into() }
}

fn arp(ip: &str) -> ArpEntry {
    ArpEntry { ip: ip.into(), mac: "aa:bb:cc:dd:ee:ff".into(), interface: String::new() }
}

#[tokio::test]
async fn pre_flight_passes_and_persists_snapshot() {
    let (_dir, store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_disk_gb(15.0);

    let metrics = validator.pre_flight("fw001", &device).await.unwrap();
    assert_eq!(metrics.disk_available_gb, 15.0);
    assert!(store.latest_pre_flight("fw001").unwrap().is_some());
}

#[tokio::test]
async fn pre_flight_disk_failure_still_persists_snapshot() {
    let (_dir, store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_disk_gb(2.0);

    let err = validator.pre_flight("fw001", &device).await.unwrap_err();
    match err {
        PreFlightError::InsufficientDisk { available_gb, required_gb } => {
            assert_eq!(available_gb, 2.0);
            assert_eq!(required_gb, 5.0);
        }
        other => panic!("expected InsufficientDisk, got {other:?}"),
    }
    // Forensic snapshot written despite the failure.
    assert!(store.latest_pre_flight("fw001").unwrap().is_some());
}

#[tokio::test]
async fn pre_flight_error_message_mentions_both_numbers() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_disk_gb(2.0);
    let message = validator.pre_flight("fw001", &device).await.unwrap_err().to_string();
    assert!(message.contains("2.00"), "{message}");
    assert!(message.contains("5.00"), "{message}");
}

#[tokio::test]
async fn pre_flight_retries_transient_errors() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.fail_next("metrics", ClientError::Connect("flap".into()));
    device.fail_next("metrics", ClientError::Timeout("300s".into()));

    assert!(validator.pre_flight("fw001", &device).await.is_ok());
    assert_eq!(device.count("metrics"), 3);
}

#[tokio::test]
async fn pre_flight_exhausts_retry_envelope() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    for _ in 0..3 {
        device.fail_next("metrics", ClientError::Connect("down".into()));
    }

    match validator.pre_flight("fw001", &device).await.unwrap_err() {
        PreFlightError::Client { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected Client, got {other:?}"),
    }
}

#[tokio::test]
async fn post_flight_without_baseline_is_noop() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    assert!(matches!(validator.post_flight("fw001", &device).await, PostFlight::NoBaseline));
}

#[tokio::test]
async fn post_flight_compares_against_newest_baseline() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_disk_gb(15.0);
    validator.pre_flight("fw001", &device).await.unwrap();

    match validator.post_flight("fw001", &device).await {
        PostFlight::Compared(report) => {
            assert!(report.validation_passed);
            assert!(report.comparison.contains_key("tcp_sessions"));
            assert!(report.comparison.contains_key("routes"));
            assert!(report.comparison.contains_key("arp_entries"));
        }
        other => panic!("expected Compared, got {other:?}"),
    }
}

#[tokio::test]
async fn post_flight_unreachable_after_retries() {
    let (_dir, _store, validator) = setup(fast_settings());
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_disk_gb(15.0);
    validator.pre_flight("fw001", &device).await.unwrap();

    for _ in 0..3 {
        device.fail_next("metrics", ClientError::Connect("still down".into()));
    }
    assert!(matches!(
        validator.post_flight("fw001", &device).await,
        PostFlight::Unreachable { attempts: 3, .. }
    ));
}

#[test]
fn tcp_sessions_compare_by_percent() {
    let settings = ValidationSettings::default();
    let pre = ValidationMetrics { tcp_sessions: 1000, ..Default::default() };
    let post = ValidationMetrics { tcp_sessions: 1040, ..Default::default() };

    let comparison = compare_metrics(&pre, &post, &settings);
    let tcp = &comparison["tcp_sessions"];
    assert_eq!(tcp.difference, 40.0);
    assert_eq!(tcp.percentage, 4.0);
    assert!(tcp.within_margin);

    let post = ValidationMetrics { tcp_sessions: 1100, ..Default::default() };
    let comparison = compare_metrics(&pre, &post, &settings);
    assert!(!comparison["tcp_sessions"].within_margin);
}

#[test]
fn zero_baseline_sessions_never_divides() {
    let settings = ValidationSettings::default();
    let pre = ValidationMetrics::default();
    let post = ValidationMetrics { tcp_sessions: 50, ..Default::default() };
    let comparison = compare_metrics(&pre, &post, &settings);
    assert_eq!(comparison["tcp_sessions"].percentage, 0.0);
}

#[test]
fn route_diff_lists_added_and_removed_by_identity() {
    let settings = ValidationSettings::default();
    let pre = ValidationMetrics {
        route_count: 2,
        routes: vec![route("10.0.0.0/8"), route("172.16.0.0/12")],
        ..Default::default()
    };
    let post = ValidationMetrics {
        route_count: 2,
        routes: vec![route("10.0.0.0/8"), route("192.168.0.0/16")],
        ..Default::default()
    };

    let comparison = compare_metrics(&pre, &post, &settings);
    let routes = &comparison["routes"];
    assert!(routes.within_margin);
    assert_eq!(routes.added.len(), 1);
    assert_eq!(routes.removed.len(), 1);
    assert_eq!(routes.added[0]["destination"], "192.168.0.0/16");
    assert_eq!(routes.removed[0]["destination"], "172.16.0.0/12");
}

#[test]
fn route_count_margin_is_absolute() {
    let mut settings = ValidationSettings::default();
    let pre = ValidationMetrics { route_count: 10, ..Default::default() };
    let post = ValidationMetrics { route_count: 9, ..Default::default() };
    assert!(!compare_metrics(&pre, &post, &settings)["routes"].within_margin);

    settings.route_margin = 1.0;
    assert!(compare_metrics(&pre, &post, &settings)["routes"].within_margin);
}

#[test]
fn arp_margin_is_absolute_and_keyed_by_ip_mac() {
    let settings = ValidationSettings::default();
    let pre = ValidationMetrics {
        arp_count: 1,
        arp_entries: vec![arp("10.0.0.2")],
        ..Default::default()
    };
    let post = ValidationMetrics {
        arp_count: 1,
        arp_entries: vec![arp("10.0.0.3")],
        ..Default::default()
    };
    let comparison = compare_metrics(&pre, &post, &settings);
    let arp_comp = &comparison["arp_entries"];
    assert!(arp_comp.within_margin);
    assert_eq!(arp_comp.added.len(), 1);
    assert_eq!(arp_comp.removed.len(), 1);
}
