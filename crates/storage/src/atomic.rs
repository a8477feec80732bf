// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON persistence.
//!
//! `write_json` writes to a temp file in the destination directory, fsyncs,
//! then renames over the target, so a reader racing a writer sees either
//! the old document or the new one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not parse. Distinguished from [`Self::NotFound`]
    /// so callers never paper over a truncated or hand-mangled document.
    #[error("corrupt JSON in {path}: {source}")]
    CorruptFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to serialize for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("out.json");
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

/// Write `value` to `path` atomically.
///
/// The parent directory is created if missing. The temp file lives in the
/// same directory as the target so the final rename never crosses a
/// filesystem boundary.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Serialize { path: path.to_path_buf(), source: e })?;

    let temp = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp).map_err(|e| StoreError::io(&temp, e))?;
        file.write_all(&body).map_err(|e| StoreError::io(&temp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&temp, e))?;
        fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Read and parse `path`.
///
/// Missing file → [`StoreError::NotFound`]; unparseable content →
/// [`StoreError::CorruptFile`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::CorruptFile { path: path.to_path_buf(), source: e })
}

/// Read `path`, returning `default` when the file does not exist.
///
/// Corrupt content still fails: a half-written or mangled file must never
/// silently become the default.
pub fn read_json_or<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, StoreError> {
    match read_json(path) {
        Ok(value) => Ok(value),
        Err(StoreError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

/// Create `base` and every listed subdirectory under it.
pub fn ensure_dirs(base: &Path, dirs: &[&str]) -> Result<(), StoreError> {
    fs::create_dir_all(base).map_err(|e| StoreError::io(base, e))?;
    for dir in dirs {
        let path = base.join(dir);
        fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
