// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! march-storage: Durable state for the march upgrade orchestrator.
//!
//! Everything under the work directory is plain JSON written through the
//! atomic temp-then-rename store. There are no file locks; concurrent
//! readers see old or new content, never partial.

pub mod atomic;
pub mod config;
pub mod inventory;
pub mod layout;
pub mod queue;
pub mod resolver;
pub mod status_store;
pub mod validation_store;

pub use atomic::{ensure_dirs, read_json, read_json_or, write_json, StoreError};
pub use config::{load_settings, load_upgrade_paths};
pub use inventory::{DeviceRecord, Inventory};
pub use layout::WorkDir;
pub use queue::{JobQueue, QueueCounts};
pub use resolver::{resolve_work_dir, WorkDirResolution, WorkDirSource};
pub use status_store::StatusStore;
pub use validation_store::{Snapshot, ValidationStore};
