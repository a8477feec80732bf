// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use march_client::{FakeDevice, FakeFactory, JobScript};
use march_core::SystemClock;
use march_storage::{load_upgrade_paths, ValidationStore, WorkDir};

mod cancellation;
mod download_only;
mod ha;
mod resume;
mod standalone;

/// Settings with all the waits collapsed for test speed.
pub(crate) fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.validation.retry_delay = 0;
    settings.reboot.initial_delay = 0;
    settings.reboot.stabilization_delay = 0;
    settings.reboot.ready_timeout = 0;
    settings.firewall.max_reboot_poll_interval = 0;
    settings.jobs.poll_interval = 0;
    settings.jobs.stall_timeout = 60;
    settings
}

pub(crate) struct Harness {
    _tmp: tempfile::TempDir,
    pub(crate) work: WorkDir,
    pub(crate) factory: FakeFactory,
    pub(crate) statuses: StatusStore,
    pub(crate) cancel: CancelSet,
    pub(crate) runner: std::sync::Arc<Runner<FakeFactory, SystemClock>>,
}

impl Harness {
    pub(crate) fn status_of(&self, serial: &str) -> DeviceStatus {
        self.statuses.load_device(serial).unwrap().unwrap()
    }
}

pub(crate) fn harness_with_settings(paths: &str, inventory: &str, settings: Settings) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let work = WorkDir::new(tmp.path().join("work"));
    work.ensure().unwrap();
    std::fs::write(work.upgrade_paths_file(), paths).unwrap();
    std::fs::write(work.inventory_file(), inventory).unwrap();

    let paths = load_upgrade_paths(&work).unwrap();
    let inventory = Inventory::load(work.inventory_file()).unwrap();
    let statuses = StatusStore::new(&work);
    let validator = Validator::new(
        ValidationStore::new(&work),
        settings.validation.clone(),
        SystemClock,
    );
    let cancel = CancelSet::new();
    let factory = FakeFactory::new();
    let runner = std::sync::Arc::new(Runner::new(
        settings,
        paths,
        inventory,
        statuses.clone(),
        validator,
        cancel.clone(),
        factory.clone(),
        SystemClock,
    ));
    Harness { _tmp: tmp, work, factory, statuses, cancel, runner }
}

pub(crate) fn harness(paths: &str, inventory: &str) -> Harness {
    harness_with_settings(paths, inventory, fast_settings())
}

/// Inventory JSON for a list of `(serial, mgmt_ip, version, ha_role)`.
pub(crate) fn inventory_of(devices: &[(&str, &str, &str, &str)]) -> String {
    let entries: Vec<String> = devices
        .iter()
        .map(|(serial, ip, version, role)| {
            format!(
                r#""{serial}": {{"hostname": "host-{serial}", "mgmt_ip": "{ip}", "current_version": "{version}", "ha_role": "{role}"}}"#
            )
        })
        .collect();
    format!(r#"{{"devices": {{{}}}}}"#, entries.join(","))
}

pub(crate) fn standalone_job(job_id: &str, serial: &str) -> Job {
    Job::new(job_id, JobType::Standalone, vec![serial.to_string()], chrono::Utc::now())
}

pub(crate) fn register_device(harness: &Harness, ip: &str, serial: &str, version: &str) -> FakeDevice {
    let device = FakeDevice::new(serial, version);
    harness.factory.register(ip, device.clone());
    device
}
