// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! march-daemon: The `marchd` orchestrator daemon.
//!
//! Watches the file-backed queue, dispatches upgrade tasks onto the
//! worker pool, consumes cancel commands, and republishes status files.
//! All operator input arrives through the work directory; there is no
//! network control plane.

pub mod clients;
pub mod dispatch;
pub mod lifecycle;
pub mod logging;
pub mod publish;

pub use clients::UnwiredFactory;
pub use dispatch::Dispatcher;
pub use lifecycle::{Daemon, DaemonOpts, LifecycleError};
pub use publish::StatusPublisher;
