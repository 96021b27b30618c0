//! Health reporting
//!
//! A health report is a pure function of the checks a service supplies; it never
//! contacts anything itself.

use crate::events::{wire_timestamp, Timestamp};
use crate::lifecycle::LifecycleState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the check every report carries
pub const SERVICE_RUNNING: &str = "service_running";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => f.write_str("healthy"),
            HealthState::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Point-in-time health of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub service: String,
    pub status: HealthState,
    #[serde(with = "wire_timestamp")]
    pub timestamp: Timestamp,
    pub checks: BTreeMap<String, bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }

    /// Names of the checks that failed, in name order
    pub fn failing_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Build a health report for `service`
///
/// The report always includes `service_running = true`; a supplied check with
/// the same name replaces it. The service is healthy iff every check passes.
pub fn health_status(service: &str, checks: &BTreeMap<String, bool>) -> HealthStatus {
    report(service, true, checks)
}

/// Like [`health_status`], with `service_running` taken from a lifecycle state
pub fn health_for_state(
    service: &str,
    state: LifecycleState,
    checks: &BTreeMap<String, bool>,
) -> HealthStatus {
    report(service, state == LifecycleState::Running, checks)
}

fn report(service: &str, running: bool, checks: &BTreeMap<String, bool>) -> HealthStatus {
    let mut all = BTreeMap::new();
    all.insert(SERVICE_RUNNING.to_string(), running);
    all.extend(checks.iter().map(|(name, ok)| (name.clone(), *ok)));

    let status = if all.values().all(|ok| *ok) {
        HealthState::Healthy
    } else {
        HealthState::Unhealthy
    };

    HealthStatus {
        service: service.to_string(),
        status,
        timestamp: Utc::now(),
        checks: all,
    }
}
