// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation metric snapshots and their comparison results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One forwarding-table entry. Identity is `destination|gateway|interface`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: String,
    pub interface: String,
}

impl RouteEntry {
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.destination, self.gateway, self.interface)
    }
}

/// One ARP cache entry. Identity is `ip|mac`; the interface is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub ip: String,
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,
}

impl ArpEntry {
    pub fn key(&self) -> String {
        format!("{}|{}", self.ip, self.mac)
    }
}

/// Point-in-time metric snapshot of one device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub tcp_sessions: u64,
    pub route_count: u64,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    pub arp_count: u64,
    #[serde(default)]
    pub arp_entries: Vec<ArpEntry>,
    pub disk_available_gb: f64,
}

/// Pre/post difference for one named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub difference: f64,
    pub percentage: f64,
    pub within_margin: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<serde_json::Value>,
}

/// Persisted outcome of a post-flight comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub serial: String,
    pub timestamp: String,
    pub pre_flight: ValidationMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_flight: Option<ValidationMetrics>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comparison: BTreeMap<String, MetricComparison>,
    pub validation_passed: bool,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
