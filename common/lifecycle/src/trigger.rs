//! Shutdown trigger and the termination channel it publishes to.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::LifecycleError;
use crate::metrics;
use crate::signals;

/// Why the process is shutting down. Carried on the termination channel so the
/// top-level run routine can log a single, attributable exit reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal (SIGINT/SIGTERM) was received.
    Signal(String),
    /// The election loop reported that this process no longer holds the lock.
    LeadershipLost,
    /// The leader could not advertise itself through the readiness condition.
    ReadinessPatchFailed,
    /// Any other caller-supplied reason.
    Requested(String),
}

impl ShutdownReason {
    /// Low-cardinality label used for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownReason::Signal(_) => "signal",
            ShutdownReason::LeadershipLost => "leadership_lost",
            ShutdownReason::ReadinessPatchFailed => "readiness_patch_failed",
            ShutdownReason::Requested(_) => "requested",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal received: {name}"),
            ShutdownReason::LeadershipLost => write!(f, "leadership lost"),
            ShutdownReason::ReadinessPatchFailed => write!(f, "readiness condition patch failed"),
            ShutdownReason::Requested(why) => write!(f, "shutdown requested: {why}"),
        }
    }
}

/// Entry point for building a trigger/waiter pair.
pub struct Shutdown;

impl Shutdown {
    pub fn builder(name: &str) -> ShutdownBuilder {
        ShutdownBuilder {
            name: name.to_string(),
            trap_signals: true,
        }
    }
}

pub struct ShutdownBuilder {
    name: String,
    trap_signals: bool,
}

impl ShutdownBuilder {
    /// Route SIGINT/SIGTERM through the trigger while waiting (default: true).
    pub fn with_trap_signals(mut self, trap_signals: bool) -> Self {
        self.trap_signals = trap_signals;
        self
    }

    pub fn build(self) -> (ShutdownTrigger, ShutdownWaiter) {
        let (tx, rx) = watch::channel(None);
        let trigger = ShutdownTrigger {
            inner: Arc::new(TriggerInner {
                name: self.name,
                state: Mutex::new(ShutdownState { requested: false }),
                tx,
            }),
        };
        let waiter = ShutdownWaiter {
            trigger: trigger.clone(),
            rx,
            trap_signals: self.trap_signals,
        };
        (trigger, waiter)
    }
}

struct ShutdownState {
    requested: bool,
}

struct TriggerInner {
    name: String,
    state: Mutex<ShutdownState>,
    tx: watch::Sender<Option<ShutdownReason>>,
}

/// Requests process-wide termination at most once. Cheap to clone; every clone
/// shares the same `requested` flag, so concurrent callers from any origin
/// race on one check-and-mark critical section.
#[derive(Clone)]
pub struct ShutdownTrigger {
    inner: Arc<TriggerInner>,
}

impl ShutdownTrigger {
    /// Request shutdown. Returns true if this call was the one that initiated
    /// it, false if shutdown was already in progress.
    ///
    /// Delivery failures (no waiter listening) are logged and swallowed: the
    /// request is still recorded and later triggers remain no-ops.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if state.requested {
            info!(
                service = %self.inner.name,
                reason = %reason,
                "Lifecycle: shutdown already in progress, ignoring trigger"
            );
            metrics::emit_shutdown_suppressed(&self.inner.name);
            return false;
        }
        state.requested = true;

        warn!(
            service = %self.inner.name,
            trigger_reason = reason.as_label(),
            "Lifecycle: shutdown triggered: {reason}"
        );
        metrics::emit_shutdown_triggered(&self.inner.name, reason.as_label());

        if self.inner.tx.send(Some(reason)).is_err() {
            error!(
                service = %self.inner.name,
                error = %LifecycleError::SignalDelivery,
                "Lifecycle: failed to trigger graceful shutdown"
            );
        }
        true
    }

    /// True once any origin has requested shutdown.
    pub fn is_requested(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requested
    }
}

/// The shutdown-wait primitive. Consumed by [`wait`](ShutdownWaiter::wait), so
/// only one shutdown sequence can ever observe the termination channel.
pub struct ShutdownWaiter {
    trigger: ShutdownTrigger,
    rx: watch::Receiver<Option<ShutdownReason>>,
    trap_signals: bool,
}

impl ShutdownWaiter {
    /// Block until shutdown is triggered from any origin and return the reason
    /// of the first trigger.
    pub async fn wait(mut self) -> ShutdownReason {
        if self.trap_signals {
            tokio::select! {
                reason = next_reason(&mut self.rx) => return reason,
                result = signals::wait_for_shutdown_signal() => match result {
                    // Route through the trigger so later election-driven triggers are no-ops
                    Ok(signal) => {
                        self.trigger.trigger(ShutdownReason::Signal(signal.to_string()));
                    }
                    Err(e) => {
                        error!(error = %e, "Lifecycle: signal trapping unavailable, waiting for explicit triggers only");
                    }
                }
            }
        }
        next_reason(&mut self.rx).await
    }
}

async fn next_reason(rx: &mut watch::Receiver<Option<ShutdownReason>>) -> ShutdownReason {
    // The waiter owns a trigger clone, so the sender outlives this receiver.
    let reason = match rx.wait_for(Option::is_some).await {
        Ok(reason) => reason.clone(),
        Err(_) => None,
    };
    reason.unwrap_or_else(|| ShutdownReason::Requested("termination channel closed".to_string()))
}
