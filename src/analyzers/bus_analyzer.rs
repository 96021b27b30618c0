use crate::alerts::Alert;
use crate::analyzers::{Analyzer, AnalyzerFuture, Detector};
use crate::bus::{publish_alert, Envelope, EventBus, Subscription};
use crate::error::{BusError, LifecycleError};
use crate::events::{Event, SourceInfo};
use crate::lifecycle::{HookFuture, Role, Service};
use crate::topology::{Exchange, Topology};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Shared<D, B> {
    detector: Mutex<D>,
    bus: Arc<B>,
    topology: Topology,
    source: SourceInfo,
    raised: AtomicU64,
}

impl<D: Detector, B: EventBus> Shared<D, B> {
    fn analyze(&self, event: &Event) -> Option<Alert> {
        let finding = self.detector.lock().unwrap().inspect(event)?;
        Some(Alert::for_event(
            finding.kind,
            finding.title,
            finding.description,
            event,
            self.source.clone(),
        ))
    }

    /// Analyze one delivery and publish the alert it produces, if any
    ///
    /// Deliveries that are not raw events, or that do not decode, are skipped.
    async fn handle(&self, envelope: Envelope) -> Result<Option<Alert>, BusError> {
        let topic = match envelope.topic() {
            Some(topic) => topic,
            None => {
                debug!("Ignoring unknown routing key {}", envelope.routing_key);
                return Ok(None);
            }
        };
        if topic.event_family().is_none() {
            debug!("Ignoring non-event topic {}", topic);
            return Ok(None);
        }

        let event = match Event::from_slice(&envelope.body) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding event on {}: {}", envelope.routing_key, e);
                return Ok(None);
            }
        };

        let alert = match self.analyze(&event) {
            Some(alert) => alert,
            None => return Ok(None),
        };

        publish_alert(self.bus.as_ref(), &self.topology, &alert).await?;
        self.raised.fetch_add(1, Ordering::Relaxed);
        info!(
            "Raised {} alert {} for event {} on {}",
            alert.severity,
            alert.alert_id,
            event.event_id(),
            event.hostname()
        );
        Ok(Some(alert))
    }

    async fn consume(&self, mut subscription: Subscription) -> Result<u64, BusError> {
        let mut raised = 0;

        while let Some(envelope) = subscription.next().await {
            match self.handle(envelope).await {
                Ok(Some(_)) => raised += 1,
                Ok(None) => {}
                Err(BusError::Closed) => return Err(BusError::Closed),
                Err(e) => warn!("Failed to publish alert: {}", e),
            }
        }

        Ok(raised)
    }
}

async fn consume_loop<D, B>(shared: Arc<Shared<D, B>>, subscription: Subscription, token: CancellationToken)
where
    D: Detector,
    B: EventBus,
{
    tokio::select! {
        _ = token.cancelled() => debug!("Consume loop cancelled"),
        result = shared.consume(subscription) => match result {
            Ok(raised) => info!("Subscription ended after {} alerts", raised),
            Err(e) => error!("Consume loop failed: {}", e),
        },
    }
}

/// Analyzer that runs a [`Detector`] over events delivered by the bus
///
/// By default it binds `#` on the events exchange, i.e. every raw-event topic.
pub struct BusAnalyzer<D, B> {
    name: String,
    version: String,
    binding: String,
    shared: Arc<Shared<D, B>>,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl<D, B> BusAnalyzer<D, B>
where
    D: Detector + 'static,
    B: EventBus + 'static,
{
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        detector: D,
        bus: Arc<B>,
        topology: Topology,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let source = SourceInfo::for_local_host(name.clone(), version.clone());

        Self {
            name,
            version,
            binding: "#".to_string(),
            shared: Arc::new(Shared {
                detector: Mutex::new(detector),
                bus,
                topology,
                source,
                raised: AtomicU64::new(0),
            }),
            token: None,
            task: None,
        }
    }

    /// Restrict the analyzer to routing keys matching `pattern`
    pub fn with_binding(mut self, pattern: impl Into<String>) -> Self {
        self.binding = pattern.into();
        self
    }

    /// Alerts raised since creation
    pub fn raised_count(&self) -> u64 {
        self.shared.raised.load(Ordering::Relaxed)
    }
}

impl<D, B> Service for BusAnalyzer<D, B>
where
    D: Detector + 'static,
    B: EventBus + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn role(&self) -> Role {
        Role::Analyzer
    }

    fn start(&mut self) -> HookFuture<'_> {
        Box::pin(async move {
            if self.task.is_some() {
                return Err(LifecycleError::StartFailed(format!(
                    "{} is already consuming",
                    self.name
                )));
            }

            let exchange = self.shared.topology.exchange_name(Exchange::Events);
            let subscription = self.shared.bus.subscribe(&exchange, &self.binding).await?;

            let token = CancellationToken::new();
            let handle = tokio::spawn(consume_loop(
                Arc::clone(&self.shared),
                subscription,
                token.clone(),
            ));
            self.token = Some(token);
            self.task = Some(handle);

            info!("{} consuming {} on {}", self.name, self.binding, exchange);
            Ok(())
        })
    }

    fn stop(&mut self) -> HookFuture<'_> {
        Box::pin(async move {
            if let Some(token) = self.token.take() {
                token.cancel();
            }
            if let Some(handle) = self.task.take() {
                handle
                    .await
                    .map_err(|e| LifecycleError::StopFailed(e.to_string()))?;
            }

            info!("{} raised {} alerts", self.name, self.raised_count());
            Ok(())
        })
    }

    fn check_running(&self) -> Result<(), LifecycleError> {
        match &self.task {
            Some(handle) if handle.is_finished() => Err(LifecycleError::Fault(format!(
                "{} consume loop exited",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

impl<D, B> Analyzer for BusAnalyzer<D, B>
where
    D: Detector + 'static,
    B: EventBus + 'static,
{
    fn consume_events(&self, subscription: Subscription) -> AnalyzerFuture<'_, u64> {
        Box::pin(async move { self.shared.consume(subscription).await })
    }

    fn analyze_event(&self, event: &Event) -> Option<Alert> {
        self.shared.analyze(event)
    }
}
