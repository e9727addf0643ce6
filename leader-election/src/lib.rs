pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod kube;
pub mod lock;
mod metrics;
pub mod modules;
pub mod pod_condition;
pub mod readiness_gate;
pub mod readyz;
pub mod retry;
pub mod server;
pub mod state;

pub use coordinator::{build_config, run, ElectionConfig, LeaderElectionCoordinator, PodTarget};
pub use error::{ApiError, ConfigError, Error, LockError, Result};
pub use readyz::ReadyzAdaptor;
