// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator command files dropped into `commands/incoming/`.

use serde::{Deserialize, Serialize};

/// Cancellation request targeting a job, a device, or both.
///
/// Consumed once by the dispatcher, then moved to `commands/processed/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelCommand {
    /// Always `"cancel_upgrade"`; other values are rejected at intake.
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_serial: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    pub timestamp: String,
}

impl CancelCommand {
    pub const COMMAND: &'static str = "cancel_upgrade";

    /// A command with no target cancels nothing; reject it at intake.
    pub fn has_target(&self) -> bool {
        !self.job_id.is_empty() || !self.device_serial.is_empty()
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
