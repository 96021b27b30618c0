//! Service lifecycle
//!
//! Every collector and analyzer process is a [`Service`] driven by a
//! [`ServiceRunner`]. The runner owns the state machine
//! `Created -> Starting -> Running -> Stopping -> Stopped`; the service only
//! supplies its start and stop hooks.

pub mod runner;
pub mod signals;

pub use runner::{RunOutcome, ServiceRunner, DEFAULT_TICK};
pub use signals::install_signal_handler;

use crate::error::LifecycleError;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Phase of a service run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archetype a service process belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Collector,
    Analyzer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Collector => f.write_str("collector"),
            Role::Analyzer => f.write_str("analyzer"),
        }
    }
}

/// Future returned by the start and stop hooks
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LifecycleError>> + Send + 'a>>;

/// A long-running process driven by [`ServiceRunner`]
///
/// Background work spawned by `start` belongs to the service and must be
/// released by `stop`. The runner calls `stop` exactly once, after `start`
/// has returned, whether or not `start` succeeded.
pub trait Service: Send {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn role(&self) -> Role;

    fn start(&mut self) -> HookFuture<'_>;

    fn stop(&mut self) -> HookFuture<'_>;

    /// Consulted once per tick while running; an error ends the run as a fault
    fn check_running(&self) -> Result<(), LifecycleError> {
        Ok(())
    }
}
