// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response-text parsers.
//!
//! The disk-space command returns a `df`-like text blob:
//!
//! ```text
//! Filesystem      Size  Used Avail Use% Mounted on
//! /dev/sda5       7.6G  4.0G  3.3G  55% /opt/pkgrepo
//! ```
//!
//! Software images land on the repository partition, so that mount is
//! checked first, with the root filesystem as fallback.

/// Partition where the device stores downloaded images.
pub const SOFTWARE_REPO_MOUNT: &str = "/opt/pkgrepo";

/// Parse available gigabytes out of `df`-like output.
///
/// Mount matching is anchored to end-of-line with a leading space, so
/// `/opt/pkgrepo_backup` is never mistaken for `/opt/pkgrepo`. Returns 0.0
/// when nothing parseable is found; callers treat that as "no space"
/// rather than an error.
pub fn parse_disk_space(output: &str) -> f64 {
    for mount in [SOFTWARE_REPO_MOUNT, "/"] {
        for line in output.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with("Filesystem") {
                continue;
            }
            if !line.ends_with(&format!(" {mount}")) {
                continue;
            }
            // Filesystem Size Used Avail Use% Mounted
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 {
                if let Some(gb) = parse_size_gb(parts[3]) {
                    return gb;
                }
            }
        }
    }
    tracing::warn!(
        head = output.chars().take(200).collect::<String>(),
        "could not parse disk space output"
    );
    0.0
}

/// Parse a size like `3.3G`, `512M`, `2T`, `100K`, or a raw byte count,
/// into gigabytes.
fn parse_size_gb(field: &str) -> Option<f64> {
    let digits_end = field
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(field.len());
    let value: f64 = field[..digits_end].parse().ok()?;
    let suffix = field[digits_end..].chars().next();

    match suffix.map(|c| c.to_ascii_uppercase()) {
        Some('G') => Some(value),
        Some('M') => Some(value / 1024.0),
        Some('T') => Some(value * 1024.0),
        Some('K') => Some(value / (1024.0 * 1024.0)),
        None => Some(value / (1024.0 * 1024.0 * 1024.0)),
        Some(_) => None,
    }
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
