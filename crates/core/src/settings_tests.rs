// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn empty_object_yields_defaults() {
    let settings: Settings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.workers.max, 5);
    assert_eq!(settings.validation.min_disk_gb, 5.0);
    assert_eq!(settings.jobs.stall_timeout, 300);
}

#[test]
fn partial_section_keeps_sibling_defaults() {
    let settings: Settings =
        serde_json::from_str(r#"{"validation": {"min_disk_gb": 8.0}}"#).unwrap();
    assert_eq!(settings.validation.min_disk_gb, 8.0);
    assert_eq!(settings.validation.tcp_session_margin, 5.0);
    assert_eq!(settings.validation.retry_attempts, 3);
}

#[parameterized(
    zero = { 0, 1 },
    in_range = { 12, 12 },
    at_cap = { 50, 50 },
    over_cap = { 200, 50 },
)]
fn worker_max_is_clamped(configured: usize, effective: usize) {
    let workers = WorkerSettings { max: configured, queue_size: 10 };
    assert_eq!(workers.effective_max(), effective);
}

#[test]
fn duration_accessors_convert_seconds() {
    let settings = Settings::default();
    assert_eq!(settings.firewall.software_check_timeout(), Duration::from_secs(90));
    assert_eq!(settings.reboot.initial_delay(), Duration::from_secs(30));
    assert_eq!(settings.jobs.poll_interval(), Duration::from_secs(5));
}

#[test]
fn settings_round_trip() {
    let mut settings = Settings::default();
    settings.workers.max = 8;
    settings.reboot.ready_timeout = 2400;
    let json = serde_json::to_string_pretty(&settings).unwrap();
    let back: Settings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settings);
}
