use crate::error::EventError;
use crate::events::{wire_timestamp, Event, SourceInfo, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity level of an alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// What kind of detection produced an alert
///
/// Each kind has a fixed severity and a fixed routing key in the alerts exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Indicator-of-compromise match (hash, address, domain)
    IocMatch,
    /// YARA rule match
    YaraMatch,
    /// Behavioral anomaly
    Behavior,
    /// Interaction with a deception asset
    Deception,
}

impl AlertKind {
    pub const ALL: [AlertKind; 4] = [
        AlertKind::IocMatch,
        AlertKind::YaraMatch,
        AlertKind::Behavior,
        AlertKind::Deception,
    ];

    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::IocMatch => Severity::High,
            AlertKind::YaraMatch => Severity::Medium,
            AlertKind::Behavior => Severity::Low,
            AlertKind::Deception => Severity::Critical,
        }
    }
}

/// An alert raised by an analyzer about a single event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    #[serde(with = "wire_timestamp")]
    pub timestamp: Timestamp,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Identifier of the event that triggered the alert
    pub event_id: String,
    /// Host the triggering activity happened on
    pub hostname: String,
    /// The analyzer that raised the alert
    pub source: SourceInfo,
}

impl Alert {
    /// Create an alert about `event`, raised by the analyzer identified by `source`
    pub fn for_event(
        kind: AlertKind,
        title: impl Into<String>,
        description: impl Into<String>,
        event: &Event,
        source: SourceInfo,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            severity: kind.severity(),
            title: title.into(),
            description: description.into(),
            event_id: event.event_id().to_string(),
            hostname: event.hostname().to_string(),
            source,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Parse(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
