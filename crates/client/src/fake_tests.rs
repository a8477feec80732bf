// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn download_job_progresses_and_marks_image() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_download_script(JobScript::Succeed { step: 50 });

    let job_id = device.download_start("10.2.0").await.unwrap().unwrap();
    let first = device.job_status(&job_id).await.unwrap();
    assert_eq!(first.stage, JobStage::Active);
    assert_eq!(first.progress, 50);
    assert!(device.image("10.2.0").map_or(true, |i| !i.downloaded));

    let second = device.job_status(&job_id).await.unwrap();
    assert!(second.is_success());
    assert!(device.image("10.2.0").unwrap().downloaded);
}

#[tokio::test]
async fn failing_job_reports_details() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_download_script(JobScript::FailAt { at: 25, details: "disk full".into() });

    let job_id = device.download_start("10.2.0").await.unwrap().unwrap();
    let status = device.job_status(&job_id).await.unwrap();
    assert!(status.is_failure());
    assert_eq!(status.details, "disk full");
}

#[tokio::test]
async fn stalled_job_never_advances_past_plateau() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_download_script(JobScript::StallAt { at: 25 });

    let job_id = device.download_start("10.2.0").await.unwrap().unwrap();
    for _ in 0..5 {
        let status = device.job_status(&job_id).await.unwrap();
        assert_eq!(status.stage, JobStage::Active);
        assert!(status.progress <= 25);
    }
}

#[tokio::test]
async fn install_then_reboot_activates_version() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.add_image("11.0.0", true);

    let job_id = device.install_start("11.0.0").await.unwrap().unwrap();
    while !device.job_status(&job_id).await.unwrap().is_success() {}

    assert_eq!(device.current_version(), "10.1.0");
    device.reboot_start().await.unwrap();
    assert_eq!(device.current_version(), "11.0.0");
    assert!(device.image("11.0.0").unwrap().current);
}

#[tokio::test]
async fn reboot_outage_blocks_system_info() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.set_reboot_outage(2);
    device.reboot_start().await.unwrap();

    assert!(device.system_info().await.unwrap_err().is_transient());
    assert!(device.system_info().await.is_err());
    assert!(device.system_info().await.is_ok());
}

#[tokio::test]
async fn injected_errors_fire_once_in_order() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.fail_next("metrics", ClientError::Timeout("300s".into()));
    assert_eq!(device.metrics().await.unwrap_err(), ClientError::Timeout("300s".into()));
    assert!(device.metrics().await.is_ok());
}

#[tokio::test]
async fn refused_download_returns_no_job_id() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.refuse_downloads(1);
    assert!(device.download_start("10.2.0").await.unwrap().is_none());
    assert!(device.download_start("10.2.0").await.unwrap().is_some());
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let device = FakeDevice::new("fw001", "10.1.0");
    assert!(matches!(
        device.job_status("job-404").await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn factory_routes_by_mgmt_ip() {
    let factory = FakeFactory::new();
    let device = FakeDevice::new("fw001", "10.1.0");
    factory.register("10.0.0.10", device);

    let known = factory.client("10.0.0.10");
    assert_eq!(known.system_info().await.unwrap().serial, "fw001");

    let unknown = factory.client("10.0.0.99");
    assert!(unknown.system_info().await.unwrap_err().is_transient());
}

#[tokio::test]
async fn call_log_records_operations() {
    let device = FakeDevice::new("fw001", "10.1.0");
    device.system_info().await.unwrap();
    device.download_start("10.2.0").await.unwrap();
    assert_eq!(device.count("system_info"), 1);
    assert!(device.calls().contains(&"download_start:10.2.0".to_string()));
}
