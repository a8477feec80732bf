// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration and upgrade-path loading.

use march_core::{Settings, UpgradePaths};

use crate::atomic::{read_json, write_json, StoreError};
use crate::layout::WorkDir;

/// Load `config/config.json`, writing the defaults back on first run so
/// operators have a complete file to edit.
pub fn load_settings(work: &WorkDir) -> Result<Settings, StoreError> {
    let path = work.config_file();
    match read_json::<Settings>(&path) {
        Ok(settings) => Ok(settings),
        Err(StoreError::NotFound(_)) => {
            let settings = Settings::default();
            write_json(&path, &settings)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(settings)
        }
        Err(e) => Err(e),
    }
}

/// Load `config/upgrade_paths.json`. A missing file is an empty table,
/// which makes every device "no upgrade path" rather than an error.
pub fn load_upgrade_paths(work: &WorkDir) -> Result<UpgradePaths, StoreError> {
    let paths = read_json_or_default(work)?;
    tracing::info!(versions = paths.len(), "loaded upgrade paths");
    Ok(paths)
}

fn read_json_or_default(work: &WorkDir) -> Result<UpgradePaths, StoreError> {
    crate::atomic::read_json_or(&work.upgrade_paths_file(), UpgradePaths::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, WorkDir) {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path().join("work"));
        work.ensure().unwrap();
        (dir, work)
    }

    #[test]
    fn first_run_writes_defaults_back() {
        let (_dir, work) = setup();
        let settings = load_settings(&work).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(work.config_file().exists());
        // Second load reads the written file.
        assert_eq!(load_settings(&work).unwrap(), settings);
    }

    #[test]
    fn operator_overrides_survive() {
        let (_dir, work) = setup();
        std::fs::write(work.config_file(), r#"{"workers": {"max": 9}}"#).unwrap();
        let settings = load_settings(&work).unwrap();
        assert_eq!(settings.workers.max, 9);
        assert_eq!(settings.workers.queue_size, 1000);
    }

    #[test]
    fn corrupt_config_is_not_silently_replaced() {
        let (_dir, work) = setup();
        std::fs::write(work.config_file(), b"{oops").unwrap();
        assert!(matches!(load_settings(&work), Err(StoreError::CorruptFile { .. })));
    }

    #[test]
    fn missing_upgrade_paths_is_empty_table() {
        let (_dir, work) = setup();
        let paths = load_upgrade_paths(&work).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn upgrade_paths_load() {
        let (_dir, work) = setup();
        std::fs::write(
            work.upgrade_paths_file(),
            r#"{"10.1.0": ["10.2.0", "11.0.0"]}"#,
        )
        .unwrap();
        let paths = load_upgrade_paths(&work).unwrap();
        assert_eq!(paths.target_for("10.1.0"), Some("11.0.0"));
    }
}
