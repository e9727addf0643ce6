//! Process shutdown coordination: a single idempotent shutdown trigger shared by
//! every origin (OS signal, leadership loss, fatal startup defect) and the one
//! shutdown-wait primitive the top-level run routine blocks on. Exactly one
//! shutdown sequence is observed regardless of how many callers race to trigger it.

mod error;
mod metrics;
mod signals;
mod trigger;

pub use error::LifecycleError;
pub use trigger::{Shutdown, ShutdownBuilder, ShutdownReason, ShutdownTrigger, ShutdownWaiter};
