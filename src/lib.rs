/// Error types shared across the crate
pub mod error;

/// Canonical telemetry event model
pub mod events;

/// Alerts raised by analyzers
pub mod alerts;

/// Exchange and routing-key catalog
pub mod topology;

/// Settings and service location
pub mod config;

/// Service lifecycle state machine
pub mod lifecycle;

/// Health reports
pub mod health;

/// Message bus seam
pub mod bus;

/// Collector role
pub mod collectors;

/// Analyzer role
pub mod analyzers;

// Re-export commonly used types
pub use alerts::{Alert, AlertKind, Severity};
pub use error::{BusError, CollectorError, ConfigError, EventError, LifecycleError};
pub use events::{Event, EventData, EventFamily, EventType, SourceInfo};
pub use lifecycle::{LifecycleState, Role, Service, ServiceRunner};
pub use topology::{Exchange, Route, Topic, Topology};
