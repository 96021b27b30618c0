use crate::bus::{self, EventBus};
use crate::collectors::{Collector, CollectorFuture, EventSource};
use crate::error::{BusError, CollectorError, LifecycleError};
use crate::events::Event;
use crate::lifecycle::{HookFuture, Role, Service};
use crate::topology::Topology;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default time between polls of the event source
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct Shared<S, B> {
    source: Mutex<S>,
    bus: Arc<B>,
    topology: Topology,
    published: AtomicU64,
}

impl<S: EventSource, B: EventBus> Shared<S, B> {
    fn collect(&self) -> Result<Vec<Event>, CollectorError> {
        self.source.lock().unwrap().poll()
    }

    async fn publish(&self, event: &Event) -> Result<(), CollectorError> {
        bus::publish_event(self.bus.as_ref(), &self.topology, event).await?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Collect once and publish everything collected
    ///
    /// An event that fails to publish is logged and dropped; a closed bus
    /// aborts the batch.
    async fn poll_once(&self) -> Result<usize, CollectorError> {
        let events = self.collect()?;
        let mut published = 0;

        for event in &events {
            match self.publish(event).await {
                Ok(()) => published += 1,
                Err(CollectorError::Bus(BusError::Closed)) => {
                    return Err(CollectorError::Bus(BusError::Closed))
                }
                Err(e) => warn!("Dropping event {}: {}", event.event_id(), e),
            }
        }

        Ok(published)
    }
}

async fn poll_loop<S, B>(shared: Arc<Shared<S, B>>, interval: Duration, token: CancellationToken)
where
    S: EventSource,
    B: EventBus,
{
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Poll loop cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        match shared.poll_once().await {
            Ok(0) => {}
            Ok(count) => debug!("Published {} events", count),
            Err(CollectorError::Bus(BusError::Closed)) => {
                error!("Bus closed, poll loop exiting");
                break;
            }
            Err(e) => warn!("Poll failed: {}", e),
        }
    }
}

/// Collector that polls an [`EventSource`] on a fixed interval
///
/// `start` spawns the poll loop; `stop` cancels it and waits for it to finish.
/// If the loop exits on its own, `check_running` reports a fault.
pub struct PollingCollector<S, B> {
    name: String,
    version: String,
    interval: Duration,
    shared: Arc<Shared<S, B>>,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl<S, B> PollingCollector<S, B>
where
    S: EventSource + 'static,
    B: EventBus + 'static,
{
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source: S,
        bus: Arc<B>,
        topology: Topology,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            interval: DEFAULT_POLL_INTERVAL,
            shared: Arc::new(Shared {
                source: Mutex::new(source),
                bus,
                topology,
                published: AtomicU64::new(0),
            }),
            token: None,
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Events published since creation
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }
}

impl<S, B> Service for PollingCollector<S, B>
where
    S: EventSource + 'static,
    B: EventBus + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn role(&self) -> Role {
        Role::Collector
    }

    fn start(&mut self) -> HookFuture<'_> {
        Box::pin(async move {
            if self.task.is_some() {
                return Err(LifecycleError::StartFailed(format!(
                    "{} is already polling",
                    self.name
                )));
            }

            let token = CancellationToken::new();
            let handle = tokio::spawn(poll_loop(
                Arc::clone(&self.shared),
                self.interval,
                token.clone(),
            ));
            self.token = Some(token);
            self.task = Some(handle);

            info!("{} polling every {:?}", self.name, self.interval);
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

            info!(
                "{} published {} events",
                self.name,
                self.published_count()
            );
            Ok(())
        })
    }

    fn check_running(&self) -> Result<(), LifecycleError> {
        match &self.task {
            Some(handle) if handle.is_finished() => Err(LifecycleError::Fault(format!(
                "{} poll loop exited",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

impl<S, B> Collector for PollingCollector<S, B>
where
    S: EventSource + 'static,
    B: EventBus + 'static,
{
    fn collect_data(&self) -> CollectorFuture<'_, Vec<Event>> {
        Box::pin(async move { self.shared.collect() })
    }

    fn publish_event<'a>(&'a self, event: &'a Event) -> CollectorFuture<'a, ()> {
        Box::pin(async move { self.shared.publish(event).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::collectors::MockEventSource;
    use crate::events::{file_event, network_event, EventType, SourceInfo};
    use crate::lifecycle::{RunOutcome, ServiceRunner};

    fn source_info() -> SourceInfo {
        SourceInfo::new("test-collector", "1.0.0", "sensor-1")
    }

    fn sample_events() -> Vec<Event> {
        vec![
            network_event(
                source_info(),
                "ws-1",
                EventType::NetworkConnectionEstablished,
                "TCP",
                "10.0.0.5",
                50123,
                "203.0.113.9",
                443,
            )
            .unwrap(),
            file_event(
                source_info(),
                "ws-1",
                EventType::FileModified,
                "/etc/passwd",
                "modified",
            )
            .unwrap(),
        ]
    }

    /// Source that yields `events` on the first poll and nothing afterwards
    fn one_shot_source(events: Vec<Event>) -> MockEventSource {
        let mut source = MockEventSource::new();
        let mut pending = Some(events);
        source
            .expect_poll()
            .returning(move || Ok(pending.take().unwrap_or_default()));
        source
    }

    #[tokio::test]
    async fn test_collect_and_publish_routes_by_family() {
        let bus = Arc::new(InMemoryBus::new());
        let mut network = bus
            .subscribe("zerotrace.events", "events.raw.network")
            .await
            .unwrap();
        let mut files = bus
            .subscribe("zerotrace.events", "events.raw.filesystem")
            .await
            .unwrap();

        let collector = PollingCollector::new(
            "test-collector",
            "1.0.0",
            one_shot_source(sample_events()),
            bus.clone(),
            Topology::default(),
        );

        let events = collector.collect_data().await.unwrap();
        assert_eq!(events.len(), 2);
        for event in &events {
            collector.publish_event(event).await.unwrap();
        }

        let received = Event::from_slice(&network.try_next().unwrap().body).unwrap();
        assert_eq!(received, events[0]);
        let received = Event::from_slice(&files.try_next().unwrap().body).unwrap();
        assert_eq!(received, events[1]);
        assert_eq!(collector.published_count(), 2);
    }

    #[tokio::test]
    async fn test_runs_under_service_runner() {
        let bus = Arc::new(InMemoryBus::new());
        let mut events = bus.subscribe("zerotrace.events", "#").await.unwrap();
        let mut collector = PollingCollector::new(
            "test-collector",
            "1.0.0",
            one_shot_source(sample_events()),
            bus.clone(),
            Topology::default(),
        )
        .with_interval(Duration::from_millis(10));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let mut runner = ServiceRunner::new().with_tick(Duration::from_millis(20));
        let outcome = runner.run(&mut collector, token).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(collector.published_count(), 2);
        assert!(events.try_next().is_some());
        assert!(events.try_next().is_some());
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_source_errors_do_not_stop_polling() {
        let bus = Arc::new(InMemoryBus::new());
        let mut source = MockEventSource::new();
        source
            .expect_poll()
            .returning(|| Err(CollectorError::CollectionFailed("sensor offline".to_string())));

        let mut collector =
            PollingCollector::new("flaky", "1.0.0", source, bus, Topology::default())
                .with_interval(Duration::from_millis(5));

        collector.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(collector.check_running().is_ok());
        collector.stop().await.unwrap();
        assert_eq!(collector.published_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_is_a_fault() {
        let bus = Arc::new(InMemoryBus::new());
        let mut source = MockEventSource::new();
        source.expect_poll().returning(|| Ok(sample_events()));

        let mut collector =
            PollingCollector::new("orphan", "1.0.0", source, bus.clone(), Topology::default())
                .with_interval(Duration::from_millis(5));

        bus.close();
        collector.start().await.unwrap();

        let mut faulted = false;
        for _ in 0..100 {
            if collector.check_running().is_err() {
                faulted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(faulted);
        collector.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let bus = Arc::new(InMemoryBus::new());
        let mut collector = PollingCollector::new(
            "twice",
            "1.0.0",
            one_shot_source(Vec::new()),
            bus,
            Topology::default(),
        );

        collector.start().await.unwrap();
        assert!(matches!(
            collector.start().await,
            Err(LifecycleError::StartFailed(_))
        ));
        collector.stop().await.unwrap();
    }
}
