use thiserror::Error;

/// Errors raised while constructing or decoding events
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Invalid event payload: {0}")]
    Validation(String),

    #[error("Failed to parse event: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Parse(err.to_string())
    }
}

/// Errors that can occur during configuration loading and service resolution
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service not configured: {0}")]
    NotResolved(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors surfaced by the service lifecycle and its hooks
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Service failed to start: {0}")]
    StartFailed(String),

    #[error("Service failed to stop: {0}")]
    StopFailed(String),

    #[error("Service fault: {0}")]
    Fault(String),

    #[error("Service has already been run")]
    AlreadyRun,

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(String),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Errors raised by message-bus implementations
#[derive(Error, Debug)]
pub enum BusError {
    #[error("No route for routing key: {0}")]
    UnknownRoute(String),

    #[error("Bus connection closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] EventError),
}

/// Errors that can occur in collectors
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to collect data: {0}")]
    CollectionFailed(String),

    #[error("Failed to build event: {0}")]
    Event(#[from] EventError),

    #[error("Failed to publish: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
