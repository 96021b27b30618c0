//! Collector role
//!
//! A collector observes host activity, turns it into [`Event`]s and publishes
//! each one on the raw-event route for its payload family.

/// Poll-driven collector that publishes whatever an [`EventSource`] yields
pub mod polling;

/// Event sources backed by files
pub mod sources;

pub use polling::PollingCollector;
pub use sources::JsonLinesSource;

use crate::error::CollectorError;
use crate::events::Event;
use crate::lifecycle::Service;
use std::future::Future;
use std::pin::Pin;

/// Future returned by collector operations
pub type CollectorFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CollectorError>> + Send + 'a>>;

/// A [`Service`] that produces events
pub trait Collector: Service {
    /// Gather whatever events are currently available
    fn collect_data(&self) -> CollectorFuture<'_, Vec<Event>>;

    /// Publish one event on its family's route
    fn publish_event<'a>(&'a self, event: &'a Event) -> CollectorFuture<'a, ()>;
}

/// Synchronous producer of events, polled by [`PollingCollector`]
#[cfg_attr(test, mockall::automock)]
pub trait EventSource: Send {
    /// Events observed since the previous poll
    fn poll(&mut self) -> Result<Vec<Event>, CollectorError>;
}
