// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! march-client: Typed device capability for the march orchestrator.
//!
//! The orchestrator talks to one firewall through the [`DeviceClient`]
//! trait. The concrete wire encoding of the appliance API is a deployment
//! detail supplied by the fleet integration; this crate defines the
//! capability, the error taxonomy, the response-text parsers, and a
//! scriptable in-memory device for tests.

pub mod api;
pub mod error;
pub mod parse;
pub mod rate_limit;
pub mod ready;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use api::{
    ClientFactory, DeviceClient, DeviceJobStatus, HaState, JobOutcome, JobStage, SoftwareImage,
    SystemInfo,
};
pub use error::ClientError;
pub use parse::parse_disk_space;
pub use rate_limit::{RateLimited, RateLimiter};
pub use ready::{wait_ready, ReadyOpts, ReadyOutcome};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeDevice, FakeFactory, JobScript};
