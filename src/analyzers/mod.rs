//! Analyzer role
//!
//! An analyzer consumes raw events from the events exchange, hands each one to
//! detection logic and publishes any resulting [`Alert`] on the alerts exchange.
//! The detection logic itself lives behind the [`Detector`] trait.

/// Analyzer driven by a bus subscription
pub mod bus_analyzer;

pub use bus_analyzer::BusAnalyzer;

use crate::alerts::{Alert, AlertKind};
use crate::bus::Subscription;
use crate::error::BusError;
use crate::events::Event;
use crate::lifecycle::Service;
use std::future::Future;
use std::pin::Pin;

/// Future returned by analyzer operations
pub type AnalyzerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BusError>> + Send + 'a>>;

/// A [`Service`] that turns events into alerts
pub trait Analyzer: Service {
    /// Handle deliveries on `subscription` until it ends
    ///
    /// Returns the number of alerts raised.
    fn consume_events(&self, subscription: Subscription) -> AnalyzerFuture<'_, u64>;

    fn analyze_event(&self, event: &Event) -> Option<Alert>;
}

/// What a detector reports about a suspicious event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
}

impl Finding {
    pub fn new(kind: AlertKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Detection logic applied to each event
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send {
    fn inspect(&mut self, event: &Event) -> Option<Finding>;
}
