//! Message bus seam
//!
//! Collectors and analyzers talk to the bus only through [`EventBus`]. A broker
//! client implements the trait in production; [`InMemoryBus`] routes within a
//! single process.

pub mod memory;

pub use memory::InMemoryBus;

use crate::alerts::Alert;
use crate::error::BusError;
use crate::events::Event;
use crate::topology::{Route, Topic, Topology};
use log::debug;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedReceiver;

/// Future returned by bus operations
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BusError>> + Send + 'a>>;

/// A message as it travels on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(route: &Route, body: Vec<u8>) -> Self {
        Self {
            exchange: route.exchange.clone(),
            routing_key: route.routing_key.to_string(),
            body,
        }
    }

    /// Catalog topic of this message, if its routing key is known
    pub fn topic(&self) -> Option<Topic> {
        Topic::from_routing_key(&self.routing_key)
    }
}

/// Publish/subscribe transport
pub trait EventBus: Send + Sync {
    fn publish<'a>(&'a self, envelope: Envelope) -> BusFuture<'a, ()>;

    /// Receive messages on `exchange` whose routing key matches `binding`
    ///
    /// Bindings use topic-exchange patterns: `*` matches one dot-separated word
    /// and `#` matches zero or more.
    fn subscribe<'a>(&'a self, exchange: &'a str, binding: &'a str) -> BusFuture<'a, Subscription>;
}

/// Stream of messages delivered to one binding
#[derive(Debug)]
pub struct Subscription {
    receiver: UnboundedReceiver<Envelope>,
}

impl Subscription {
    pub fn new(receiver: UnboundedReceiver<Envelope>) -> Self {
        Self { receiver }
    }

    /// Next message, or `None` once the bus has closed
    pub async fn next(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Next message if one is already queued
    pub fn try_next(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

/// Publish `event` on the raw-event route for its payload family
pub async fn publish_event<B>(bus: &B, topology: &Topology, event: &Event) -> Result<Route, BusError>
where
    B: EventBus + ?Sized,
{
    let route = topology.route_for_family(event.family());
    let body = event.to_json_bytes()?;
    bus.publish(Envelope::new(&route, body)).await?;
    debug!(
        "Published event {} to {}/{}",
        event.event_id(),
        route.exchange,
        route.routing_key
    );
    Ok(route)
}

/// Publish `alert` on the route for its kind
pub async fn publish_alert<B>(bus: &B, topology: &Topology, alert: &Alert) -> Result<Route, BusError>
where
    B: EventBus + ?Sized,
{
    let route = topology.route_for_alert(alert.kind);
    let body = alert.to_json_bytes()?;
    bus.publish(Envelope::new(&route, body)).await?;
    debug!(
        "Published alert {} to {}/{}",
        alert.alert_id, route.exchange, route.routing_key
    );
    Ok(route)
}

/// Whether `routing_key` matches the topic-exchange `pattern`
pub fn binding_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => (word == "*" || word == first) && words_match(rest, key_rest),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_binding() {
        assert!(binding_matches("events.raw.network", "events.raw.network"));
        assert!(!binding_matches("events.raw.network", "events.raw.processes"));
    }

    #[test]
    fn test_wildcard_bindings() {
        assert!(binding_matches("#", "alerts.critical.deception"));
        assert!(binding_matches("events.raw.*", "events.raw.filesystem"));
        assert!(!binding_matches("events.*", "events.raw.filesystem"));
        assert!(binding_matches("events.#", "events.raw.filesystem"));
        assert!(binding_matches("alerts.#.deception", "alerts.critical.deception"));
        assert!(binding_matches("incidents.critical.#", "incidents.critical"));
        assert!(!binding_matches("alerts.*", "events.raw.network"));
    }

    #[test]
    fn test_envelope_topic() {
        let route = Topology::default().route(Topic::ActionIsolateHost);
        let envelope = Envelope::new(&route, b"{}".to_vec());
        assert_eq!(envelope.exchange, "zerotrace.actions");
        assert_eq!(envelope.topic(), Some(Topic::ActionIsolateHost));

        let unknown = Envelope {
            routing_key: "events.raw.registry".to_string(),
            ..envelope
        };
        assert_eq!(unknown.topic(), None);
    }
}
