/// Alerts emitted by analyzers
pub mod alert;

pub use alert::{Alert, AlertKind, Severity};
