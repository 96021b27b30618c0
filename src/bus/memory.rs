use crate::bus::{binding_matches, BusFuture, Envelope, EventBus, Subscription};
use crate::error::BusError;
use crate::topology::Topic;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedSender};

struct Binding {
    exchange: String,
    pattern: String,
    sender: UnboundedSender<Envelope>,
}

#[derive(Default)]
struct BusState {
    bindings: Vec<Binding>,
    closed: bool,
}

/// Topic-exchange routing within one process
///
/// Messages nobody is bound to are dropped. Only routing keys from the topic
/// catalog are accepted. Clones share the same bindings.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting messages and end every subscription
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.bindings.clear();
        info!("In-memory bus closed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .bindings
            .iter()
            .filter(|binding| !binding.sender.is_closed())
            .count()
    }

    fn route(&self, envelope: Envelope) -> Result<usize, BusError> {
        if Topic::from_routing_key(&envelope.routing_key).is_none() {
            return Err(BusError::UnknownRoute(envelope.routing_key));
        }

        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BusError::Closed);
        }

        state.bindings.retain(|binding| !binding.sender.is_closed());

        let mut delivered = 0;
        for binding in state.bindings.iter().filter(|binding| {
            binding.exchange == envelope.exchange
                && binding_matches(&binding.pattern, &envelope.routing_key)
        }) {
            if binding.sender.send(envelope.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            debug!(
                "No subscribers for {}/{}; message dropped",
                envelope.exchange, envelope.routing_key
            );
        }
        Ok(delivered)
    }

    fn bind(&self, exchange: &str, pattern: &str) -> Result<Subscription, BusError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BusError::Closed);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.bindings.push(Binding {
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
            sender,
        });
        debug!("Bound {} on {}", pattern, exchange);
        Ok(Subscription::new(receiver))
    }
}

impl EventBus for InMemoryBus {
    fn publish<'a>(&'a self, envelope: Envelope) -> BusFuture<'a, ()> {
        Box::pin(async move { self.route(envelope).map(|_| ()) })
    }

    fn subscribe<'a>(&'a self, exchange: &'a str, binding: &'a str) -> BusFuture<'a, Subscription> {
        Box::pin(async move { self.bind(exchange, binding) })
    }
}
