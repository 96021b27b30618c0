//! Canonical telemetry event model
//!
//! Every collector publishes and every analyzer consumes [`Event`] values. An event
//! carries provenance ([`SourceInfo`]), the host the activity was observed on, a
//! type from a closed catalog ([`EventType`]) and exactly one payload variant
//! ([`EventData`]) tagged by its [`EventFamily`].
//!
//! Events are validated when constructed and again when decoded from the wire, and
//! cannot be modified afterwards: fields are only reachable through accessors.

use crate::error::EventError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Closed catalog of observable activity
///
/// Serialized as the dotted wire name returned by [`EventType::as_str`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "&'static str", try_from = "String")]
pub enum EventType {
    ProcessCreated,
    ProcessTerminated,
    NetworkConnectionEstablished,
    NetworkConnectionClosed,
    FileCreated,
    FileModified,
    FileDeleted,
    PersistenceRegistryModified,
    PersistenceStartupCreated,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::ProcessCreated,
        EventType::ProcessTerminated,
        EventType::NetworkConnectionEstablished,
        EventType::NetworkConnectionClosed,
        EventType::FileCreated,
        EventType::FileModified,
        EventType::FileDeleted,
        EventType::PersistenceRegistryModified,
        EventType::PersistenceStartupCreated,
    ];

    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProcessCreated => "process.created",
            EventType::ProcessTerminated => "process.terminated",
            EventType::NetworkConnectionEstablished => "network.connection.established",
            EventType::NetworkConnectionClosed => "network.connection.closed",
            EventType::FileCreated => "file.created",
            EventType::FileModified => "file.modified",
            EventType::FileDeleted => "file.deleted",
            EventType::PersistenceRegistryModified => "persistence.registry.modified",
            EventType::PersistenceStartupCreated => "persistence.startup.created",
        }
    }

    /// Payload family conventionally paired with this event type
    pub fn family(&self) -> EventFamily {
        match self {
            EventType::ProcessCreated | EventType::ProcessTerminated => EventFamily::Process,
            EventType::NetworkConnectionEstablished | EventType::NetworkConnectionClosed => {
                EventFamily::Network
            }
            EventType::FileCreated | EventType::FileModified | EventType::FileDeleted => {
                EventFamily::File
            }
            EventType::PersistenceRegistryModified | EventType::PersistenceStartupCreated => {
                EventFamily::Persistence
            }
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| EventError::Parse(format!("unknown event type '{}'", s)))
    }
}

impl From<EventType> for &'static str {
    fn from(event_type: EventType) -> Self {
        event_type.as_str()
    }
}

impl TryFrom<String> for EventType {
    type Error = EventError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Payload family; also the tag of [`EventData`] on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventFamily {
    Process,
    Network,
    File,
    Persistence,
}

impl EventFamily {
    pub const ALL: [EventFamily; 4] = [
        EventFamily::Process,
        EventFamily::Network,
        EventFamily::File,
        EventFamily::Persistence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventFamily::Process => "process",
            EventFamily::Network => "network",
            EventFamily::File => "file",
            EventFamily::Persistence => "persistence",
        }
    }
}

impl fmt::Display for EventFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the service that produced an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceInfo {
    /// Name of the producing service
    pub service: String,
    /// Version of the producing service
    pub version: String,
    /// Hostname the producing service runs on
    pub hostname: String,
}

impl SourceInfo {
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            hostname: hostname.into(),
        }
    }

    /// Build provenance for a service running on the local machine
    pub fn for_local_host(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(service, version, local_hostname())
    }
}

/// Hostname of the local machine, or `"unknown"` if it cannot be determined
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Algorithm-tagged file hashes; each digest is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashInfo {
    /// MD5 digest, lowercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// SHA-1 digest, lowercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// SHA-256 digest, lowercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Process activity payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessEventData {
    /// Process identifier
    pub pid: u32,
    /// Parent process identifier
    pub ppid: u32,
    /// Image name without the directory, e.g. `powershell.exe`
    pub process_name: String,
    /// Full command line as launched
    pub command_line: String,
    /// Absolute path of the executable image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
    /// Account the process runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Logon session the process belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u32>,
    /// Windows mandatory integrity level (`Low`, `Medium`, `High`, `System`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_level: Option<String>,
    /// Identifier that stays unique across PID reuse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_guid: Option<String>,
    /// Digests of the executable image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashInfo>,
}

impl ProcessEventData {
    /// Payload with the required fields set and every optional field empty
    pub fn new(
        pid: u32,
        ppid: u32,
        process_name: impl Into<String>,
        command_line: impl Into<String>,
    ) -> Self {
        Self {
            pid,
            ppid,
            process_name: process_name.into(),
            command_line: command_line.into(),
            executable_path: None,
            user: None,
            session_id: None,
            integrity_level: None,
            process_guid: None,
            hashes: None,
        }
    }
}

/// Transport protocol of a network connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
        }
    }
}

impl FromStr for Protocol {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "ICMP" => Ok(Protocol::Icmp),
            other => Err(EventError::Validation(format!(
                "protocol must be one of TCP, UDP, ICMP, got '{}'",
                other
            ))),
        }
    }
}

/// Network connection payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkEventData {
    /// Transport protocol
    pub protocol: Protocol,
    /// Local address, IPv4 or IPv6 text form
    pub source_ip: String,
    /// Local port, never zero
    pub source_port: u16,
    /// Remote address, IPv4 or IPv6 text form
    pub destination_ip: String,
    /// Remote port, never zero
    pub destination_port: u16,
    /// PID of the process owning the socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Name of the process owning the socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Bytes sent over the connection so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    /// Bytes received over the connection so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    /// Socket state as reported by the OS, e.g. `ESTABLISHED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_state: Option<String>,
}

impl NetworkEventData {
    /// Build a payload from loosely-typed inputs, enforcing the protocol set and port range
    pub fn parse(
        protocol: &str,
        source_ip: impl Into<String>,
        source_port: u32,
        destination_ip: impl Into<String>,
        destination_port: u32,
    ) -> Result<Self, EventError> {
        Ok(Self {
            protocol: protocol.parse()?,
            source_ip: source_ip.into(),
            source_port: checked_port("source_port", source_port)?,
            destination_ip: destination_ip.into(),
            destination_port: checked_port("destination_port", destination_port)?,
            process_id: None,
            process_name: None,
            bytes_sent: None,
            bytes_received: None,
            connection_state: None,
        })
    }

    fn validate(&self) -> Result<(), EventError> {
        checked_port("source_port", self.source_port.into())?;
        checked_port("destination_port", self.destination_port.into())?;
        Ok(())
    }
}

fn checked_port(field: &str, value: u32) -> Result<u16, EventError> {
    match u16::try_from(value) {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(EventError::Validation(format!(
            "{} must be in 1..=65535, got {}",
            field, value
        ))),
    }
}

/// Filesystem action recorded by a file event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Created => "created",
            FileAction::Modified => "modified",
            FileAction::Deleted => "deleted",
            FileAction::Renamed => "renamed",
        }
    }
}

impl FromStr for FileAction {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(FileAction::Created),
            "modified" => Ok(FileAction::Modified),
            "deleted" => Ok(FileAction::Deleted),
            "renamed" => Ok(FileAction::Renamed),
            other => Err(EventError::Validation(format!(
                "action must be one of created, modified, deleted, renamed, got '{}'",
                other
            ))),
        }
    }
}

/// Filesystem activity payload
///
/// `old_file_path` is expected for [`FileAction::Renamed`] but is not required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEventData {
    /// Path the action applied to
    pub file_path: String,
    /// What happened to the file
    pub action: FileAction,
    /// Previous path of a renamed file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_file_path: Option<String>,
    /// Size in bytes after the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// PID of the process that performed the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Name of the process that performed the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Account the acting process ran as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Digests of the file contents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashInfo>,
    /// Filesystem attributes such as `hidden` or `readonly`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_attributes: Option<Vec<String>>,
}

impl FileEventData {
    pub fn new(file_path: impl Into<String>, action: FileAction) -> Self {
        Self {
            file_path: file_path.into(),
            action,
            old_file_path: None,
            file_size: None,
            process_id: None,
            process_name: None,
            user: None,
            hashes: None,
            file_attributes: None,
        }
    }
}

/// Persistence mechanism payload (registry run keys, startup items, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceEventData {
    /// Mechanism used, e.g. `registry_run_key` or `startup_folder`
    pub technique: String,
    /// Where the entry was written (registry key, directory, unit file)
    pub location: String,
    /// Command or path the entry launches
    pub value: String,
    /// PID of the process that created the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Name of the process that created the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Account the creating process ran as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl PersistenceEventData {
    pub fn new(
        technique: impl Into<String>,
        location: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            technique: technique.into(),
            location: location.into(),
            value: value.into(),
            process_id: None,
            process_name: None,
            user: None,
        }
    }
}

/// Event payload, tagged on the wire by `"family"`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum EventData {
    Process(ProcessEventData),
    Network(NetworkEventData),
    File(FileEventData),
    Persistence(PersistenceEventData),
}

impl EventData {
    pub fn family(&self) -> EventFamily {
        match self {
            EventData::Process(_) => EventFamily::Process,
            EventData::Network(_) => EventFamily::Network,
            EventData::File(_) => EventFamily::File,
            EventData::Persistence(_) => EventFamily::Persistence,
        }
    }

    /// Check the per-variant field constraints that the type system does not encode
    pub fn validate(&self) -> Result<(), EventError> {
        match self {
            EventData::Network(network) => network.validate(),
            EventData::Process(_) | EventData::File(_) | EventData::Persistence(_) => Ok(()),
        }
    }
}

/// A single immutable telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    event_id: String,
    #[serde(serialize_with = "wire_timestamp::serialize")]
    timestamp: Timestamp,
    event_type: EventType,
    source: SourceInfo,
    hostname: String,
    data: EventData,
}

/// Unvalidated wire form of [`Event`]
#[derive(Deserialize)]
struct EventRecord {
    event_id: String,
    #[serde(deserialize_with = "wire_timestamp::deserialize")]
    timestamp: Timestamp,
    event_type: EventType,
    source: SourceInfo,
    hostname: String,
    data: EventData,
}

impl TryFrom<EventRecord> for Event {
    type Error = EventError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        Event::with_identity(
            record.event_type,
            record.source,
            record.hostname,
            record.data,
            Some(record.event_id),
            Some(record.timestamp),
        )
    }
}

impl Event {
    /// Construct an event with a fresh identifier, stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns `EventError::Validation` if the payload violates its variant's constraints.
    pub fn new(
        event_type: EventType,
        source: SourceInfo,
        hostname: impl Into<String>,
        data: EventData,
    ) -> Result<Self, EventError> {
        Self::with_identity(event_type, source, hostname, data, None, None)
    }

    /// Construct an event, optionally supplying its identifier and timestamp
    ///
    /// Missing values are generated: a UUID v4 identifier and the current UTC time.
    /// The event type is not checked against the payload family; see
    /// [`Event::family_matches_type`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::Validation` if the payload violates its variant's constraints,
    /// a supplied identifier is empty, or the timestamp falls outside years 0000 to 9999
    /// (the range an RFC 3339 wire timestamp can carry).
    pub fn with_identity(
        event_type: EventType,
        source: SourceInfo,
        hostname: impl Into<String>,
        data: EventData,
        event_id: Option<String>,
        timestamp: Option<Timestamp>,
    ) -> Result<Self, EventError> {
        data.validate()?;

        let timestamp = timestamp.unwrap_or_else(Utc::now);
        if !(0..=9999).contains(&timestamp.year()) {
            return Err(EventError::Validation(format!(
                "timestamp year must be in 0000..=9999, got {}",
                timestamp.year()
            )));
        }

        let event_id = match event_id {
            Some(id) if id.trim().is_empty() => {
                return Err(EventError::Validation(
                    "event_id must not be empty".to_string(),
                ))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            event_id,
            timestamp,
            event_type,
            source,
            hostname: hostname.into(),
            data,
        })
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Host the observed activity happened on
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Family of the carried payload
    pub fn family(&self) -> EventFamily {
        self.data.family()
    }

    /// Whether the payload family is the one conventionally paired with the event type
    pub fn family_matches_type(&self) -> bool {
        self.event_type.family() == self.data.family()
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(|e| EventError::Parse(e.to_string()))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Parse(e.to_string()))
    }

    /// Decode an event from JSON text
    ///
    /// # Errors
    ///
    /// Returns `EventError::Parse` for malformed JSON, unknown event types, unknown
    /// payload families or payloads that fail validation.
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Build a process event from its required fields
pub fn process_event(
    source: SourceInfo,
    hostname: &str,
    event_type: EventType,
    pid: u32,
    ppid: u32,
    process_name: &str,
    command_line: &str,
) -> Result<Event, EventError> {
    Event::new(
        event_type,
        source,
        hostname,
        EventData::Process(ProcessEventData::new(pid, ppid, process_name, command_line)),
    )
}

/// Build a network event from its required fields
///
/// Ports are taken as `u32` so out-of-range values are reported instead of truncated.
#[allow(clippy::too_many_arguments)]
pub fn network_event(
    source: SourceInfo,
    hostname: &str,
    event_type: EventType,
    protocol: &str,
    source_ip: &str,
    source_port: u32,
    destination_ip: &str,
    destination_port: u32,
) -> Result<Event, EventError> {
    let data = NetworkEventData::parse(
        protocol,
        source_ip,
        source_port,
        destination_ip,
        destination_port,
    )?;
    Event::new(event_type, source, hostname, EventData::Network(data))
}

/// Build a file event from its required fields
pub fn file_event(
    source: SourceInfo,
    hostname: &str,
    event_type: EventType,
    file_path: &str,
    action: &str,
) -> Result<Event, EventError> {
    let data = FileEventData::new(file_path, action.parse()?);
    Event::new(event_type, source, hostname, EventData::File(data))
}

/// Build a persistence event from its required fields
pub fn persistence_event(
    source: SourceInfo,
    hostname: &str,
    event_type: EventType,
    technique: &str,
    location: &str,
    value: &str,
) -> Result<Event, EventError> {
    Event::new(
        event_type,
        source,
        hostname,
        EventData::Persistence(PersistenceEventData::new(technique, location, value)),
    )
}

/// ISO-8601 UTC timestamps with a trailing `Z` and full sub-second precision
pub(crate) mod wire_timestamp {
    use super::Timestamp;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(timestamp: &Timestamp) -> String {
        timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn serialize<S: Serializer>(timestamp: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", text, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn source() -> SourceInfo {
        SourceInfo::new("process-collector", "1.0.0", "sensor-01")
    }

    fn sample_payload(family: EventFamily) -> EventData {
        match family {
            EventFamily::Process => EventData::Process(ProcessEventData {
                executable_path: Some("/usr/bin/curl".to_string()),
                hashes: Some(HashInfo {
                    sha256: Some("e3b0c44298fc1c149afbf4c8996fb924".to_string()),
                    ..HashInfo::default()
                }),
                ..ProcessEventData::new(4242, 1, "curl", "curl http://example.com")
            }),
            EventFamily::Network => EventData::Network(
                NetworkEventData::parse("TCP", "10.0.0.5", 51234, "93.184.216.34", 443).unwrap(),
            ),
            EventFamily::File => EventData::File(FileEventData {
                file_size: Some(2048),
                file_attributes: Some(vec!["hidden".to_string()]),
                ..FileEventData::new("/tmp/payload.bin", FileAction::Created)
            }),
            EventFamily::Persistence => EventData::Persistence(PersistenceEventData::new(
                "registry_run_key",
                r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run",
                "C:\\Users\\Public\\updater.exe",
            )),
        }
    }

    #[test]
    fn test_every_event_type_round_trips() {
        for event_type in EventType::ALL {
            let event = Event::new(
                event_type,
                source(),
                "workstation-7",
                sample_payload(event_type.family()),
            )
            .unwrap();

            let json = event.to_json().unwrap();
            let decoded = Event::from_json(&json).unwrap();
            assert_eq!(event, decoded, "round trip failed for {}", event_type);
        }
    }

    #[test]
    fn test_event_type_family_table() {
        assert_eq!(EventType::ProcessTerminated.family(), EventFamily::Process);
        assert_eq!(
            EventType::NetworkConnectionClosed.family(),
            EventFamily::Network
        );
        assert_eq!(EventType::FileDeleted.family(), EventFamily::File);
        assert_eq!(
            EventType::PersistenceStartupCreated.family(),
            EventFamily::Persistence
        );
    }

    #[test]
    fn test_event_type_from_str() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
        assert!(matches!(
            "process.spawned".parse::<EventType>(),
            Err(EventError::Parse(_))
        ));
    }

    #[test]
    fn test_wire_shape() {
        let event = process_event(
            source(),
            "workstation-7",
            EventType::ProcessCreated,
            100,
            1,
            "bash",
            "bash -i",
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event_type"], "process.created");
        assert_eq!(value["hostname"], "workstation-7");
        assert_eq!(value["source"]["service"], "process-collector");
        assert_eq!(value["data"]["family"], "process");
        assert_eq!(value["data"]["pid"], 100);
        assert!(value["data"].get("user").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_network_port_bounds() {
        let low = network_event(
            source(),
            "host",
            EventType::NetworkConnectionEstablished,
            "TCP",
            "10.0.0.1",
            0,
            "10.0.0.2",
            80,
        );
        assert!(matches!(low, Err(EventError::Validation(_))));

        let high = network_event(
            source(),
            "host",
            EventType::NetworkConnectionEstablished,
            "UDP",
            "10.0.0.1",
            53000,
            "10.0.0.2",
            70000,
        );
        assert!(matches!(high, Err(EventError::Validation(_))));

        let edges = network_event(
            source(),
            "host",
            EventType::NetworkConnectionEstablished,
            "ICMP",
            "10.0.0.1",
            1,
            "10.0.0.2",
            65535,
        );
        assert!(edges.is_ok());
    }

    #[test]
    fn test_network_protocol_closed_set() {
        let result = network_event(
            source(),
            "host",
            EventType::NetworkConnectionEstablished,
            "HTTP",
            "10.0.0.1",
            40000,
            "10.0.0.2",
            80,
        );
        assert!(matches!(result, Err(EventError::Validation(_))));

        // Matching is exact, as on the wire
        assert!("tcp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_zero_port_rejected_when_built_directly() {
        let mut data = NetworkEventData::parse("TCP", "10.0.0.1", 1000, "10.0.0.2", 80).unwrap();
        data.source_port = 0;
        let result = Event::new(
            EventType::NetworkConnectionClosed,
            source(),
            "host",
            EventData::Network(data),
        );
        assert!(matches!(result, Err(EventError::Validation(_))));
    }

    #[test]
    fn test_file_action_closed_set() {
        let copied = file_event(
            source(),
            "host",
            EventType::FileCreated,
            "/tmp/a",
            "copied",
        );
        assert!(matches!(copied, Err(EventError::Validation(_))));

        let renamed = file_event(
            source(),
            "host",
            EventType::FileModified,
            "/tmp/b",
            "renamed",
        )
        .unwrap();
        match renamed.data() {
            EventData::File(file) => {
                assert_eq!(file.action, FileAction::Renamed);
                assert_eq!(file.old_file_path, None);
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let with_old_path = Event::new(
            EventType::FileModified,
            source(),
            "host",
            EventData::File(FileEventData {
                old_file_path: Some("/tmp/a".to_string()),
                ..FileEventData::new("/tmp/b", FileAction::Renamed)
            }),
        );
        assert!(with_old_path.is_ok());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let event = persistence_event(
                source(),
                "host",
                EventType::PersistenceStartupCreated,
                "startup_folder",
                "/etc/init.d",
                "backdoor.sh",
            )
            .unwrap();
            assert!(ids.insert(event.event_id().to_string()));
        }
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_supplied_identity_is_kept() {
        let timestamp = "2024-03-01T12:30:45.123456Z"
            .parse::<Timestamp>()
            .unwrap();
        let event = Event::with_identity(
            EventType::FileDeleted,
            source(),
            "host",
            sample_payload(EventFamily::File),
            Some("evt-1".to_string()),
            Some(timestamp),
        )
        .unwrap();

        assert_eq!(event.event_id(), "evt-1");
        assert_eq!(event.timestamp(), timestamp);

        let json = event.to_json().unwrap();
        assert!(json.contains("\"timestamp\":\"2024-03-01T12:30:45.123456Z\""));
    }

    #[test]
    fn test_timestamp_outside_four_digit_years_rejected() {
        use chrono::TimeZone;

        let build = |timestamp| {
            Event::with_identity(
                EventType::ProcessCreated,
                source(),
                "host",
                sample_payload(EventFamily::Process),
                None,
                Some(timestamp),
            )
        };

        let too_late = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(build(too_late), Err(EventError::Validation(_))));
        let too_early = Utc.with_ymd_and_hms(-1, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(build(too_early), Err(EventError::Validation(_))));

        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        let event = build(last).unwrap();
        let decoded = Event::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);

        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        let event = build(first).unwrap();
        assert_eq!(Event::from_json(&event.to_json().unwrap()).unwrap(), event);
    }

    #[test]
    fn test_empty_supplied_id_rejected() {
        let result = Event::with_identity(
            EventType::FileDeleted,
            source(),
            "host",
            sample_payload(EventFamily::File),
            Some("  ".to_string()),
            None,
        );
        assert!(matches!(result, Err(EventError::Validation(_))));
    }

    #[test]
    fn test_family_mismatch_is_allowed_but_detectable() {
        let event = Event::new(
            EventType::ProcessCreated,
            source(),
            "host",
            sample_payload(EventFamily::Network),
        )
        .unwrap();
        assert_eq!(event.family(), EventFamily::Network);
        assert!(!event.family_matches_type());
    }

    #[test]
    fn test_unknown_event_type_fails_to_parse() {
        let json = r#"{
            "event_id": "abc",
            "timestamp": "2024-01-01T00:00:00Z",
            "event_type": "process.exploded",
            "source": {"service": "s", "version": "1", "hostname": "h"},
            "hostname": "h",
            "data": {"family": "process", "pid": 1, "ppid": 0, "process_name": "init", "command_line": "init"}
        }"#;
        assert!(matches!(Event::from_json(json), Err(EventError::Parse(_))));
    }

    #[test]
    fn test_invalid_wire_payloads_fail_to_parse() {
        let template = |data: &str| {
            format!(
                r#"{{"event_id":"abc","timestamp":"2024-01-01T00:00:00Z","event_type":"network.connection.established","source":{{"service":"s","version":"1","hostname":"h"}},"hostname":"h","data":{}}}"#,
                data
            )
        };

        let zero_port = template(
            r#"{"family":"network","protocol":"TCP","source_ip":"1.1.1.1","source_port":0,"destination_ip":"2.2.2.2","destination_port":80}"#,
        );
        assert!(matches!(Event::from_json(&zero_port), Err(EventError::Parse(_))));

        let big_port = template(
            r#"{"family":"network","protocol":"TCP","source_ip":"1.1.1.1","source_port":1,"destination_ip":"2.2.2.2","destination_port":70000}"#,
        );
        assert!(Event::from_json(&big_port).is_err());

        let bad_protocol = template(
            r#"{"family":"network","protocol":"HTTP","source_ip":"1.1.1.1","source_port":1,"destination_ip":"2.2.2.2","destination_port":80}"#,
        );
        assert!(Event::from_json(&bad_protocol).is_err());

        let unknown_family = template(r#"{"family":"registry","key":"x"}"#);
        assert!(Event::from_json(&unknown_family).is_err());

        let valid = template(
            r#"{"family":"network","protocol":"UDP","source_ip":"1.1.1.1","source_port":5353,"destination_ip":"2.2.2.2","destination_port":53}"#,
        );
        let event = Event::from_json(&valid).unwrap();
        assert_eq!(event.event_id(), "abc");
    }

    #[test]
    fn test_timestamp_requires_offset() {
        let json = r#"{
            "event_id": "abc",
            "timestamp": "2024-01-01T00:00:00",
            "event_type": "process.created",
            "source": {"service": "s", "version": "1", "hostname": "h"},
            "hostname": "h",
            "data": {"family": "process", "pid": 1, "ppid": 0, "process_name": "init", "command_line": "init"}
        }"#;
        assert!(Event::from_json(json).is_err());
    }

    #[test]
    fn test_local_source_info() {
        let info = SourceInfo::for_local_host("collector", "0.1.0");
        assert_eq!(info.service, "collector");
        assert!(!info.hostname.is_empty());
    }
}
