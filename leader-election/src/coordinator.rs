//! Leadership lifecycle: build the election claim, react to acquire/lose, and
//! turn every unrecoverable condition into one orderly shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lifecycle::{Shutdown, ShutdownReason, ShutdownTrigger, ShutdownWaiter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, Error};
use crate::identity::ElectionIdentity;
use crate::kube::{KubeClient, PodClient};
use crate::lock::etcd::EtcdLockProvider;
use crate::lock::{LeadershipListener, LockProvider, LockReference, ResourceLock, TimingPolicy};
use crate::metrics;
use crate::modules::ModuleRegistry;
use crate::readiness_gate::ReadinessGatePatcher;
use crate::readyz::ReadyzAdaptor;
use crate::state::{ElectionHandle, ElectionState, SharedElectionState};

/// Everything the lock service needs to campaign on behalf of this process.
#[derive(Clone)]
pub struct ElectionConfig {
    pub name: String,
    pub identity: ElectionIdentity,
    pub lock: Arc<dyn ResourceLock>,
    pub timing: TimingPolicy,
}

/// Build an election config with a freshly generated identity.
///
/// Nothing is cached: retrying after a failure produces a new identity.
pub fn build_config(
    name: &str,
    timing: TimingPolicy,
    reference: &LockReference,
    provider: &dyn LockProvider,
) -> Result<ElectionConfig, ConfigError> {
    let identity = ElectionIdentity::generate()?;
    let lock = provider.new_lock(reference, &identity)?;
    Ok(ElectionConfig {
        name: name.to_string(),
        identity,
        lock,
        timing,
    })
}

/// Where the readiness condition is written. Both halves come from the
/// environment; either one missing means we are not running in a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodTarget {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

pub struct LeaderElectionCoordinator {
    state: SharedElectionState,
    modules: ModuleRegistry,
    patcher: ReadinessGatePatcher,
    pod: PodTarget,
    shutdown: ShutdownTrigger,
    module_shutdown_timeout: Duration,
}

impl LeaderElectionCoordinator {
    pub fn new(
        modules: ModuleRegistry,
        patcher: ReadinessGatePatcher,
        pod: PodTarget,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            state: SharedElectionState::new(),
            modules,
            patcher,
            pod,
            shutdown,
            module_shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Upper bound on waiting for leader-only modules to stop during shutdown.
    pub fn with_module_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.module_shutdown_timeout = timeout;
        self
    }

    /// Read-only view for health checks.
    pub fn handle(&self) -> ElectionHandle {
        self.state.handle()
    }

    pub fn state(&self) -> ElectionState {
        self.state.current()
    }

    /// Run the election on its own task and block until shutdown is triggered
    /// from any origin. Cancels `cancel` on the way out, which stops the
    /// election loop and every leader-only module.
    pub async fn run(
        self: Arc<Self>,
        config: ElectionConfig,
        cancel: CancellationToken,
        waiter: ShutdownWaiter,
    ) -> ShutdownReason {
        info!(
            name = %config.name,
            identity = %config.identity,
            lock = %config.lock.describe(),
            "starting leader election"
        );

        let election = {
            let lock = Arc::clone(&config.lock);
            let listener: Arc<dyn LeadershipListener> = self.clone();
            let timing = config.timing;
            let token = cancel.clone();
            tokio::spawn(async move { lock.run(timing, listener, token).await })
        };

        let reason = waiter.wait().await;
        info!(name = %config.name, reason = %reason, "leader election shutting down");

        self.enter_shutdown();
        cancel.cancel();

        if let Err(e) = election.await {
            error!(error = %e, "election task panicked");
        }
        if tokio::time::timeout(self.module_shutdown_timeout, self.modules.join_all())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.module_shutdown_timeout.as_secs_f64(),
                "modules still running after shutdown timeout"
            );
        }

        reason
    }

    fn enter_shutdown(&self) {
        if self.state.mark_shutting_down() == ElectionState::Leading {
            metrics::emit_leading(false);
        }
    }

    fn fail_stop(&self, reason: ShutdownReason) {
        self.enter_shutdown();
        self.shutdown.trigger(reason);
    }
}

#[async_trait]
impl LeadershipListener for LeaderElectionCoordinator {
    async fn on_acquire(&self, ctx: CancellationToken) {
        if !self.state.begin_leading() {
            warn!(state = ?self.state.current(), "ignoring leadership acquisition outside standby");
            return;
        }
        metrics::emit_transition("acquired");
        metrics::emit_leading(true);
        info!(modules = self.modules.len(), "became leader, starting modules");

        self.modules.start_all(ctx).await;

        if let Err(e) = self
            .patcher
            .patch_readiness(self.pod.name.as_deref(), self.pod.namespace.as_deref())
            .await
        {
            // Leaving a leader running without its readiness condition would
            // misroute traffic; stop instead. The lease is left to expire.
            error!(error = %e, "fatal: leader could not set readiness condition, terminating");
            self.fail_stop(ShutdownReason::ReadinessPatchFailed);
        }
    }

    async fn on_lose(&self) {
        // Already shutting down: the lock is stepping down because we
        // cancelled it, not because the claim was lost.
        if self.state.current() == ElectionState::ShuttingDown {
            metrics::emit_transition("released");
            info!("leadership released during shutdown");
        } else {
            metrics::emit_transition("lost");
            error!("leader election lost, gracefully terminating");
        }
        self.fail_stop(ShutdownReason::LeadershipLost);
    }
}

/// Wire the production collaborators together and run until shutdown.
///
/// Construction failures are logged and returned before any election starts.
pub async fn run(
    config: &Config,
    readyz: Arc<ReadyzAdaptor>,
    modules: ModuleRegistry,
) -> Result<ShutdownReason, Error> {
    info!(
        lock_type = %config.resource_lock_type,
        namespace = %config.resource_namespace,
        name = %config.resource_name,
        lease_duration_secs = config.lease_duration_secs,
        renew_deadline_secs = config.renew_deadline_secs,
        retry_period_secs = config.retry_period_secs,
        "config for leader election"
    );

    let (election_config, coordinator, waiter) = match prepare(config, modules).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error = %e, "couldn't create leader election config");
            return Err(e.into());
        }
    };

    readyz.bind(coordinator.handle());

    Ok(coordinator
        .run(election_config, CancellationToken::new(), waiter)
        .await)
}

async fn prepare(
    config: &Config,
    modules: ModuleRegistry,
) -> Result<(ElectionConfig, Arc<LeaderElectionCoordinator>, ShutdownWaiter), ConfigError> {
    let timing = config.timing_policy()?;
    let reference = config.lock_reference();

    let pod_client: Arc<dyn PodClient> =
        Arc::new(KubeClient::in_cluster(&config.kube_client_config())?);
    let provider =
        EtcdLockProvider::connect(&config.etcd_endpoint_list(), &config.etcd_prefix).await?;

    let election_config = build_config(&config.election_name, timing, &reference, &provider)?;

    let (trigger, waiter) = Shutdown::builder(&config.election_name).build();
    let patcher = ReadinessGatePatcher::new(pod_client, &config.readiness_condition_type)
        .with_attempt_timeout(config.readiness_attempt_timeout());
    let coordinator = LeaderElectionCoordinator::new(modules, patcher, config.pod_target(), trigger)
        .with_module_shutdown_timeout(config.module_shutdown_timeout());

    Ok((election_config, Arc::new(coordinator), waiter))
}
