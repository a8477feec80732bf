// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upgrade path table.
//!
//! Maps a source version to the ordered list of versions the device must
//! march through; the last element is the final target. The table is
//! operator-maintained (`config/upgrade_paths.json`) and read-only here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradePaths(BTreeMap<String, Vec<String>>);

impl UpgradePaths {
    pub fn new(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }

    /// Ordered versions to march through from `version`, if a path exists.
    pub fn path_for(&self, version: &str) -> Option<&[String]> {
        self.0.get(version).map(Vec::as_slice)
    }

    /// Final target for `version`, if a non-empty path exists.
    pub fn target_for(&self, version: &str) -> Option<&str> {
        self.0.get(version).and_then(|p| p.last()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> UpgradePaths {
        serde_json::from_str(
            r#"{
                "10.1.0": ["10.2.0", "10.2.5", "11.0.0"],
                "10.2.0": ["10.2.5", "11.0.0"],
                "11.0.0": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn path_for_known_version() {
        let paths = table();
        assert_eq!(
            paths.path_for("10.1.0"),
            Some(&["10.2.0".to_string(), "10.2.5".to_string(), "11.0.0".to_string()][..])
        );
    }

    #[test]
    fn path_for_unknown_version_is_none() {
        assert!(table().path_for("9.1.0").is_none());
    }

    #[test]
    fn target_is_last_element() {
        assert_eq!(table().target_for("10.2.0"), Some("11.0.0"));
    }

    #[test]
    fn empty_path_has_no_target() {
        assert_eq!(table().target_for("11.0.0"), None);
    }
}
