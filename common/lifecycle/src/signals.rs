use tokio::signal::unix::{signal, SignalKind};

use crate::error::LifecycleError;

/// Resolves with the name of the first SIGINT/SIGTERM received.
pub(crate) async fn wait_for_shutdown_signal() -> Result<&'static str, LifecycleError> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|source| LifecycleError::SignalHandler {
            signal: "SIGINT",
            source,
        })?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|source| LifecycleError::SignalHandler {
            signal: "SIGTERM",
            source,
        })?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    tracing::info!("received {name}");
    Ok(name)
}
