// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default client factory for the stock binary.
//!
//! The appliance wire codec is deployment-specific and ships as a
//! separate crate implementing [`DeviceClient`]. The stock `marchd`
//! binary runs the full orchestration surface (queue handling, dry
//! runs, cancellation, status publication) and reports a connect
//! failure for live device operations until a transport-backed factory
//! is wired into [`crate::Daemon::start`].

use async_trait::async_trait;
use march_client::{
    ClientError, ClientFactory, DeviceClient, DeviceJobStatus, HaState, SoftwareImage, SystemInfo,
};
use march_core::ValidationMetrics;
use std::sync::Arc;
use std::time::Duration;

/// Factory whose clients have no wire transport behind them.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnwiredFactory;

impl ClientFactory for UnwiredFactory {
    fn client(&self, mgmt_ip: &str) -> Arc<dyn DeviceClient> {
        Arc::new(UnwiredClient { mgmt_ip: mgmt_ip.to_string() })
    }
}

struct UnwiredClient {
    mgmt_ip: String,
}

impl UnwiredClient {
    fn err(&self) -> ClientError {
        ClientError::Connect(format!(
            "no device transport linked into this build (target {})",
            self.mgmt_ip
        ))
    }
}

#[async_trait]
impl DeviceClient for UnwiredClient {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        Err(self.err())
    }

    async fn ha_state(&self) -> Result<HaState, ClientError> {
        Err(self.err())
    }

    async fn metrics(&self) -> Result<ValidationMetrics, ClientError> {
        Err(self.err())
    }

    async fn disk_space(&self) -> Result<f64, ClientError> {
        Err(self.err())
    }

    async fn refresh_software_list(&self, _timeout: Duration) -> Result<bool, ClientError> {
        Err(self.err())
    }

    async fn software_info(&self, _timeout: Duration) -> Result<Vec<SoftwareImage>, ClientError> {
        Err(self.err())
    }

    async fn download_start(&self, _version: &str) -> Result<Option<String>, ClientError> {
        Err(self.err())
    }

    async fn install_start(&self, _version: &str) -> Result<Option<String>, ClientError> {
        Err(self.err())
    }

    async fn reboot_start(&self) -> Result<bool, ClientError> {
        Err(self.err())
    }

    async fn job_status(&self, _job_id: &str) -> Result<DeviceJobStatus, ClientError> {
        Err(self.err())
    }
}
