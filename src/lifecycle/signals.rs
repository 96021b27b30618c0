use crate::error::LifecycleError;
use log::info;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on SIGINT or SIGTERM
///
/// Only one handler can be installed per process.
///
/// # Errors
///
/// Returns `LifecycleError::SignalHandler` if the handler cannot be registered,
/// including when one has already been installed.
pub fn install_signal_handler(token: CancellationToken) -> Result<(), LifecycleError> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        token.cancel();
    })
    .map_err(|e| LifecycleError::SignalHandler(e.to_string()))
}
