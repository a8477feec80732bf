// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-flight and post-flight validation.
//!
//! Pre-flight gates the upgrade on disk space and snapshots the device's
//! traffic metrics. Post-flight re-fetches the metrics once the device is
//! back and diffs them against the newest pre-flight snapshot. Post-flight
//! is never fatal: a reachable device serving traffic is the real success
//! criterion, divergence is reported for the operator.

use march_client::{ClientError, DeviceClient};
use march_core::{
    iso_ts, Clock, MetricComparison, ValidationMetrics, ValidationReport, ValidationSettings,
};
use march_storage::{StoreError, ValidationStore};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why pre-flight validation failed.
#[derive(Debug, Error)]
pub enum PreFlightError {
    #[error("Insufficient disk space: {available_gb:.2} GB available, {required_gb:.2} GB required")]
    InsufficientDisk { available_gb: f64, required_gb: f64 },

    #[error("validation error after {attempts} attempts: {last}")]
    Client { attempts: u32, last: ClientError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How post-flight validation ended. None of these fail the upgrade.
#[derive(Debug)]
pub enum PostFlight {
    /// Metrics compared against the newest pre-flight snapshot.
    Compared(ValidationReport),
    /// No pre-flight snapshot exists for this device.
    NoBaseline,
    /// The device stayed unreachable through the retry envelope.
    Unreachable { attempts: u32, last: ClientError },
}

pub struct Validator<C: Clock> {
    store: ValidationStore,
    settings: ValidationSettings,
    clock: C,
}

impl<C: Clock> Validator<C> {
    pub fn new(store: ValidationStore, settings: ValidationSettings, clock: C) -> Self {
        Self { store, settings, clock }
    }

    /// Fetch metrics (with retry) and enforce the disk-space floor.
    ///
    /// The snapshot is persisted even when the disk check fails, so the
    /// forensic record of what the device looked like survives.
    pub async fn pre_flight(
        &self,
        serial: &str,
        client: &dyn DeviceClient,
    ) -> Result<ValidationMetrics, PreFlightError> {
        tracing::info!(serial, "running pre-flight validation");
        let metrics = self
            .fetch_metrics(serial, client)
            .await
            .map_err(|(attempts, last)| PreFlightError::Client { attempts, last })?;

        self.store.save_pre_flight(serial, &metrics, self.clock.utc_now())?;

        let required = self.settings.min_disk_gb;
        if metrics.disk_available_gb < required {
            tracing::error!(
                serial,
                available_gb = metrics.disk_available_gb,
                required_gb = required,
                "pre-flight disk check failed"
            );
            return Err(PreFlightError::InsufficientDisk {
                available_gb: metrics.disk_available_gb,
                required_gb: required,
            });
        }

        tracing::info!(
            serial,
            tcp_sessions = metrics.tcp_sessions,
            routes = metrics.route_count,
            arp = metrics.arp_count,
            disk_gb = metrics.disk_available_gb,
            "pre-flight validation passed"
        );
        Ok(metrics)
    }

    /// Fetch metrics (with retry) and diff against the newest pre-flight
    /// snapshot. Persists the comparison report; swallows store errors
    /// because nothing here may fail the upgrade.
    pub async fn post_flight(&self, serial: &str, client: &dyn DeviceClient) -> PostFlight {
        tracing::info!(serial, "running post-flight validation");

        let baseline = match self.store.latest_pre_flight(serial) {
            Ok(Some(metrics)) => metrics,
            Ok(None) => {
                tracing::warn!(serial, "no pre-flight snapshot to compare against");
                return PostFlight::NoBaseline;
            }
            Err(e) => {
                tracing::warn!(serial, error = %e, "could not read pre-flight snapshot");
                return PostFlight::NoBaseline;
            }
        };

        let post = match self.fetch_metrics(serial, client).await {
            Ok(metrics) => metrics,
            Err((attempts, last)) => {
                tracing::error!(serial, attempts, error = %last, "post-flight metrics unreachable");
                return PostFlight::Unreachable { attempts, last };
            }
        };

        let comparison = compare_metrics(&baseline, &post, &self.settings);
        let passed = comparison.values().all(|c| c.within_margin);
        let report = ValidationReport {
            serial: serial.to_string(),
            timestamp: iso_ts(self.clock.utc_now()),
            pre_flight: baseline,
            post_flight: Some(post),
            comparison,
            validation_passed: passed,
        };

        if let Err(e) = self.store.save_post_flight(serial, &report, self.clock.utc_now()) {
            tracing::warn!(serial, error = %e, "failed to persist post-flight report");
        }

        if passed {
            tracing::info!(serial, "post-flight validation passed");
        } else {
            log_divergence(serial, &report);
        }
        PostFlight::Compared(report)
    }

    /// Metric fetch with the configured exponential-backoff envelope.
    async fn fetch_metrics(
        &self,
        serial: &str,
        client: &dyn DeviceClient,
    ) -> Result<ValidationMetrics, (u32, ClientError)> {
        let attempts = self.settings.retry_attempts.max(1);
        let mut delay = self.settings.retry_delay();
        let mut last = ClientError::Connect("no attempt made".into());

        for attempt in 1..=attempts {
            match client.metrics().await {
                Ok(metrics) => return Ok(metrics),
                Err(e) => {
                    last = e;
                    if attempt < attempts {
                        tracing::warn!(
                            serial,
                            attempt,
                            attempts,
                            error = %last,
                            delay_secs = delay.as_secs_f64(),
                            "metric fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay = delay.mul_f64(self.settings.retry_backoff.max(1.0));
                    }
                }
            }
        }
        Err((attempts, last))
    }
}

/// Diff two snapshots under the configured margins.
///
/// TCP sessions compare by percentage; route and ARP counts compare by
/// absolute difference, with the added/removed entries listed by identity
/// key.
pub fn compare_metrics(
    pre: &ValidationMetrics,
    post: &ValidationMetrics,
    settings: &ValidationSettings,
) -> BTreeMap<String, MetricComparison> {
    let mut comparison = BTreeMap::new();

    let tcp_diff = post.tcp_sessions as f64 - pre.tcp_sessions as f64;
    let tcp_pct = if pre.tcp_sessions > 0 { tcp_diff / pre.tcp_sessions as f64 * 100.0 } else { 0.0 };
    comparison.insert(
        "tcp_sessions".to_string(),
        MetricComparison {
            difference: tcp_diff,
            percentage: tcp_pct,
            within_margin: tcp_pct.abs() <= settings.tcp_session_margin,
            added: Vec::new(),
            removed: Vec::new(),
        },
    );

    let route_diff = post.route_count as f64 - pre.route_count as f64;
    let pre_keys: std::collections::HashSet<String> = pre.routes.iter().map(|r| r.key()).collect();
    let post_keys: std::collections::HashSet<String> = post.routes.iter().map(|r| r.key()).collect();
    comparison.insert(
        "routes".to_string(),
        MetricComparison {
            difference: route_diff,
            percentage: 0.0,
            within_margin: route_diff.abs() <= settings.route_margin,
            added: post
                .routes
                .iter()
                .filter(|r| !pre_keys.contains(&r.key()))
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
            removed: pre
                .routes
                .iter()
                .filter(|r| !post_keys.contains(&r.key()))
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
        },
    );

    let arp_diff = post.arp_count as f64 - pre.arp_count as f64;
    let pre_keys: std::collections::HashSet<String> =
        pre.arp_entries.iter().map(|a| a.key()).collect();
    let post_keys: std::collections::HashSet<String> =
        post.arp_entries.iter().map(|a| a.key()).collect();
    comparison.insert(
        "arp_entries".to_string(),
        MetricComparison {
            difference: arp_diff,
            percentage: 0.0,
            within_margin: arp_diff.abs() <= settings.arp_margin,
            added: post
                .arp_entries
                .iter()
                .filter(|a| !pre_keys.contains(&a.key()))
                .filter_map(|a| serde_json::to_value(a).ok())
                .collect(),
            removed: pre
                .arp_entries
                .iter()
                .filter(|a| !post_keys.contains(&a.key()))
                .filter_map(|a| serde_json::to_value(a).ok())
                .collect(),
        },
    );

    comparison
}

fn log_divergence(serial: &str, report: &ValidationReport) {
    for (metric, comp) in &report.comparison {
        if comp.within_margin {
            continue;
        }
        tracing::warn!(
            serial,
            metric,
            difference = comp.difference,
            percentage = comp.percentage,
            added = comp.added.len(),
            removed = comp.removed.len(),
            "post-flight metric outside margin"
        );
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
