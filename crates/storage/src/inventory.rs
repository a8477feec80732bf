// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only device inventory.
//!
//! The discovery probe owns `devices/inventory.json`; the orchestrator
//! only reads it. `reload()` is cheap and called at the start of each
//! upgrade task so a fresh discovery run is picked up without a restart.

use march_core::HaRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::atomic::{read_json_or, StoreError};

/// One inventoried device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub mgmt_ip: String,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub ha_role: HaRole,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_serial: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    devices: HashMap<String, DeviceRecord>,
    #[serde(default)]
    last_updated: String,
}

/// In-memory snapshot of the inventory file.
#[derive(Debug)]
pub struct Inventory {
    file: PathBuf,
    devices: HashMap<String, DeviceRecord>,
    last_updated: String,
}

impl Inventory {
    /// Load the inventory, treating a missing file as empty.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut inventory = Self {
            file: file.into(),
            devices: HashMap::new(),
            last_updated: String::new(),
        };
        inventory.reload()?;
        Ok(inventory)
    }

    /// Re-read the file from disk.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let contents: InventoryFile = read_json_or(&self.file, InventoryFile::default())?;
        tracing::debug!(
            devices = contents.devices.len(),
            last_updated = %contents.last_updated,
            "loaded inventory"
        );
        self.devices = contents.devices;
        self.last_updated = contents.last_updated;
        Ok(())
    }

    pub fn get(&self, serial: &str) -> Option<&DeviceRecord> {
        self.devices.get(serial)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
