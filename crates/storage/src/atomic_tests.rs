// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[test]
fn write_then_read_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let doc = Doc { name: "fw001".into(), count: 3 };

    write_json(&path, &doc).unwrap();
    let back: Doc = read_json(&path).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn write_creates_missing_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/c/doc.json");
    write_json(&path, &Doc { name: "x".into(), count: 0 }).unwrap();
    assert!(path.exists());
}

#[test]
fn write_replaces_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json(&path, &Doc { name: "old".into(), count: 1 }).unwrap();
    write_json(&path, &Doc { name: "new".into(), count: 2 }).unwrap();
    let back: Doc = read_json(&path).unwrap();
    assert_eq!(back.name, "new");
}

#[test]
fn write_leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json(&path, &Doc { name: "x".into(), count: 0 }).unwrap();
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["doc.json".to_string()]);
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_json::<Doc>(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn garbage_content_is_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, b"{not json").unwrap();
    let err = read_json::<Doc>(&path).unwrap_err();
    assert!(matches!(err, StoreError::CorruptFile { .. }));
}

#[test]
fn read_json_or_defaults_only_on_missing() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let map: BTreeMap<String, u32> = read_json_or(&missing, BTreeMap::new()).unwrap();
    assert!(map.is_empty());

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"]]]").unwrap();
    let err = read_json_or::<BTreeMap<String, u32>>(&corrupt, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, StoreError::CorruptFile { .. }));
}

#[test]
fn ensure_dirs_builds_full_tree() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("work");
    ensure_dirs(&base, &["queue/pending", "queue/active", "status/devices"]).unwrap();
    assert!(base.join("queue/pending").is_dir());
    assert!(base.join("status/devices").is_dir());
}

#[test]
fn ensure_dirs_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("work");
    ensure_dirs(&base, &["queue/pending"]).unwrap();
    ensure_dirs(&base, &["queue/pending"]).unwrap();
}
