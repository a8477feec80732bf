// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn explicit_flag_wins_over_everything() {
    let resolution = resolve_with(
        Some(PathBuf::from("/custom")),
        Some(PathBuf::from("/from-env")),
        None,
    );
    assert_eq!(resolution.path, PathBuf::from("/custom"));
    assert_eq!(resolution.source, WorkDirSource::Flag);
}

#[test]
fn env_var_wins_over_user_config() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(USER_CONFIG_FILE),
        r#"{"work_dir": "/from-user-config"}"#,
    )
    .unwrap();

    let resolution = resolve_with(
        None,
        Some(PathBuf::from("/from-env")),
        Some(home.path().to_path_buf()),
    );
    assert_eq!(resolution.path, PathBuf::from("/from-env"));
    assert_eq!(resolution.source, WorkDirSource::Env);
}

#[test]
fn empty_env_var_is_ignored() {
    let resolution = resolve_with(None, Some(PathBuf::new()), None);
    assert_eq!(resolution.source, WorkDirSource::Default);
}

#[test]
fn user_config_is_read_from_home() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(USER_CONFIG_FILE),
        r#"{"work_dir": "/from-user-config"}"#,
    )
    .unwrap();

    let resolution = resolve_with(None, None, Some(home.path().to_path_buf()));
    assert_eq!(resolution.path, PathBuf::from("/from-user-config"));
    assert_eq!(resolution.source, WorkDirSource::UserConfig);
}

#[test]
fn malformed_user_config_falls_through_to_default() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join(USER_CONFIG_FILE), b"{broken").unwrap();

    let resolution = resolve_with(None, None, Some(home.path().to_path_buf()));
    assert_eq!(resolution.source, WorkDirSource::Default);
    assert_eq!(resolution.path, PathBuf::from(DEFAULT_WORK_DIR));
}

#[test]
fn default_when_nothing_is_set() {
    let resolution = resolve_with(None, None, None);
    assert_eq!(resolution.path, PathBuf::from(DEFAULT_WORK_DIR));
    assert_eq!(resolution.source, WorkDirSource::Default);
}

#[test]
fn describe_names_the_source() {
    let resolution = resolve_with(Some(PathBuf::from("/custom")), None, None);
    assert_eq!(resolution.describe(), "Work directory: /custom (from --work-dir flag)");
}
