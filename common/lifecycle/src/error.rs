//! Lifecycle error types. Callers log these; none of them escalate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The shutdown request was recorded but nobody is waiting on the
    /// termination channel (the waiter was dropped or never started).
    #[error("failed to deliver shutdown signal: no shutdown waiter is listening")]
    SignalDelivery,

    /// Installing an OS signal handler failed.
    #[error("failed to install {signal} handler: {source}")]
    SignalHandler {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}
