use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleState, Service};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Interval between cancellation checks while running
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The cancellation token fired
    Cancelled,
    /// The start hook returned an error
    StartFailed,
    /// `check_running` reported a fault
    Fault,
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Drives a [`Service`] through its lifecycle
///
/// A runner is single-use. Hook failures are logged and end the run; they are
/// reported through the returned [`RunOutcome`], never as an error.
pub struct ServiceRunner {
    tick: Duration,
    stop_deadline: Option<Duration>,
    state: watch::Sender<LifecycleState>,
}

impl Default for ServiceRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRunner {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            tick: DEFAULT_TICK,
            stop_deadline: None,
            state,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Bound the time spent waiting on the stop hook
    ///
    /// Without a deadline a stop hook that never returns stalls shutdown.
    pub fn with_stop_deadline(mut self, deadline: Duration) -> Self {
        self.stop_deadline = Some(deadline);
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        debug!("Lifecycle {} -> {}", previous, next);
    }

    /// Run `service` until `token` is cancelled, start fails, or a fault is reported
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::AlreadyRun` if this runner has been used before.
    pub async fn run<S>(
        &mut self,
        service: &mut S,
        token: CancellationToken,
    ) -> Result<RunOutcome, LifecycleError>
    where
        S: Service + ?Sized,
    {
        if self.state() != LifecycleState::Created {
            return Err(LifecycleError::AlreadyRun);
        }

        self.transition(LifecycleState::Starting);
        info!(
            "Starting {} {} ({})",
            service.name(),
            service.version(),
            service.role()
        );

        let outcome = match service.start().await {
            Ok(()) => {
                self.transition(LifecycleState::Running);
                info!("{} is running", service.name());
                self.supervise(service, &token).await
            }
            Err(e) => {
                error!("{} failed to start: {}", service.name(), e);
                RunOutcome::StartFailed
            }
        };

        self.transition(LifecycleState::Stopping);
        info!("Stopping {}", service.name());
        self.stop_service(service).await;

        self.transition(LifecycleState::Stopped);
        info!("{} stopped ({:?})", service.name(), outcome);
        Ok(outcome)
    }

    async fn supervise<S>(&self, service: &mut S, token: &CancellationToken) -> RunOutcome
    where
        S: Service + ?Sized,
    {
        loop {
            tokio::time::sleep(self.tick).await;

            if token.is_cancelled() {
                info!("{} received shutdown request", service.name());
                return RunOutcome::Cancelled;
            }

            if let Err(e) = service.check_running() {
                error!("{} fault: {}", service.name(), e);
                return RunOutcome::Fault;
            }
        }
    }

    async fn stop_service<S>(&self, service: &mut S)
    where
        S: Service + ?Sized,
    {
        let name = service.name().to_string();
        let result = match self.stop_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, service.stop()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} did not stop within {:?}; abandoning", name, deadline);
                    return;
                }
            },
            None => service.stop().await,
        };

        if let Err(e) = result {
            error!("{} failed to stop cleanly: {}", name, e);
        }
    }
}
