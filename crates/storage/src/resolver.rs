// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-directory resolution with source tracking.
//!
//! Priority: explicit argument > `MARCH_HOME` environment variable >
//! `~/.march.config.json` > built-in default. The winning source is
//! recorded so the startup log can say where the path came from.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the work directory.
pub const ENV_VAR: &str = "MARCH_HOME";

/// Per-user override file in the home directory.
pub const USER_CONFIG_FILE: &str = ".march.config.json";

/// Fallback when nothing else names a work directory.
pub const DEFAULT_WORK_DIR: &str = "/opt/march";

/// Where the resolved work directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDirSource {
    Flag,
    Env,
    UserConfig,
    Default,
}

march_core::simple_display! {
    WorkDirSource {
        Flag => "from --work-dir flag",
        Env => "from MARCH_HOME environment variable",
        UserConfig => "from ~/.march.config.json",
        Default => "default",
    }
}

/// Result of work-directory resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirResolution {
    pub path: PathBuf,
    pub source: WorkDirSource,
}

impl WorkDirResolution {
    pub fn describe(&self) -> String {
        format!("Work directory: {} ({})", self.path.display(), self.source)
    }
}

#[derive(Deserialize)]
struct UserConfig {
    work_dir: Option<PathBuf>,
}

fn user_config_work_dir(home: &Path) -> Option<PathBuf> {
    let path = home.join(USER_CONFIG_FILE);
    let bytes = std::fs::read(path).ok()?;
    let config: UserConfig = serde_json::from_slice(&bytes).ok()?;
    config.work_dir
}

/// Resolution core, parameterized over the ambient inputs for testability.
fn resolve_with(
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    home: Option<PathBuf>,
) -> WorkDirResolution {
    if let Some(path) = explicit {
        return WorkDirResolution { path, source: WorkDirSource::Flag };
    }
    if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
        return WorkDirResolution { path, source: WorkDirSource::Env };
    }
    if let Some(path) = home.as_deref().and_then(user_config_work_dir) {
        return WorkDirResolution { path, source: WorkDirSource::UserConfig };
    }
    WorkDirResolution {
        path: PathBuf::from(DEFAULT_WORK_DIR),
        source: WorkDirSource::Default,
    }
}

/// Resolve the work directory from the process environment.
pub fn resolve_work_dir(explicit: Option<PathBuf>) -> WorkDirResolution {
    resolve_with(explicit, std::env::var_os(ENV_VAR).map(PathBuf::from), dirs::home_dir())
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
