#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use leader_election::coordinator::PodTarget;
use leader_election::identity::ElectionIdentity;
use leader_election::kube::PodClient;
use leader_election::lock::{
    LeadershipListener, LockProvider, LockReference, ResourceLock, ResourceLockKind, TimingPolicy,
};
use leader_election::readiness_gate::{ReadinessGatePatcher, DEFAULT_CONDITION_TYPE};
use leader_election::retry::FixedRetryPolicy;
use leader_election::{ApiError, LockError};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const POD_NAME: &str = "cloudcore-0";
pub const POD_NAMESPACE: &str = "kubeedge";

pub async fn wait_for_condition<F, Fut>(timeout: Duration, interval: Duration, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if f().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
    panic!("condition not met within {timeout:?}");
}

pub fn fast_timing() -> TimingPolicy {
    TimingPolicy::new(
        Duration::from_millis(300),
        Duration::from_millis(200),
        Duration::from_millis(20),
    )
    .expect("valid timing")
}

pub fn lock_reference() -> LockReference {
    LockReference {
        lock_kind: ResourceLockKind::Leases,
        namespace: POD_NAMESPACE.to_string(),
        name: "cloudcorelease".to_string(),
    }
}

pub fn pod_target() -> PodTarget {
    PodTarget {
        name: Some(POD_NAME.to_string()),
        namespace: Some(POD_NAMESPACE.to_string()),
    }
}

pub fn patcher(client: Arc<FakePodClient>, retry: FixedRetryPolicy) -> ReadinessGatePatcher {
    ReadinessGatePatcher::new(client, DEFAULT_CONDITION_TYPE).with_retry_policy(retry)
}

pub fn fast_retry() -> FixedRetryPolicy {
    FixedRetryPolicy::new(5, Duration::from_millis(10))
}

// ── In-memory lock ──────────────────────────────────────────────

/// Shared single-holder lock. Whoever sets `holder` first leads; the claim is
/// never released, mirroring a lease that is left to expire.
#[derive(Clone, Default)]
pub struct MemoryLockProvider {
    holder: Arc<Mutex<Option<String>>>,
    acquisitions: Arc<AtomicUsize>,
    lost: CancellationToken,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another process already holds the lock.
    pub fn held_by(identity: &str) -> Self {
        let provider = Self::default();
        *provider.holder.lock().unwrap() = Some(identity.to_string());
        provider
    }

    pub fn holder(&self) -> Option<String> {
        self.holder.lock().unwrap().clone()
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Simulate a failed renewal on the current holder.
    pub fn lose_leadership(&self) {
        self.lost.cancel();
    }
}

impl LockProvider for MemoryLockProvider {
    fn new_lock(
        &self,
        reference: &LockReference,
        identity: &ElectionIdentity,
    ) -> Result<Arc<dyn ResourceLock>, LockError> {
        reference.validate()?;
        Ok(Arc::new(MemoryLock {
            provider: self.clone(),
            identity: identity.to_string(),
        }))
    }
}

pub struct MemoryLock {
    provider: MemoryLockProvider,
    identity: String,
}

impl MemoryLock {
    fn try_acquire(&self) -> bool {
        let mut holder = self.provider.holder.lock().unwrap();
        if holder.is_some() {
            return false;
        }
        *holder = Some(self.identity.clone());
        self.provider.acquisitions.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[async_trait]
impl ResourceLock for MemoryLock {
    fn describe(&self) -> String {
        format!("memory lock as {}", self.identity)
    }

    async fn run(
        &self,
        timing: TimingPolicy,
        listener: Arc<dyn LeadershipListener>,
        cancel: CancellationToken,
    ) {
        loop {
            if self.try_acquire() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(timing.retry_period) => {}
            }
        }

        let leadership = cancel.child_token();
        listener.on_acquire(leadership.clone()).await;
        tokio::select! {
            _ = leadership.cancelled() => {}
            _ = self.provider.lost.cancelled() => {}
        }
        leadership.cancel();
        listener.on_lose().await;
    }
}

// ── Scripted pod API ────────────────────────────────────────────

/// Pod API fake. Patches are applied the way the apiserver applies a strategic
/// merge patch to `status.conditions`: entries merge on `type`.
#[derive(Default)]
pub struct FakePodClient {
    pod: Mutex<Value>,
    get_calls: AtomicUsize,
    patch_calls: AtomicUsize,
    get_failures_left: AtomicUsize,
    patch_failures_left: AtomicUsize,
    hang_gets: bool,
    write_after_get: Mutex<Option<(String, String)>>,
    last_patch: Mutex<Option<Value>>,
}

impl FakePodClient {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    /// Reject the first `n` patches with a 500.
    pub fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            pod: Mutex::new(pod_json()),
            patch_failures_left: AtomicUsize::new(n),
            ..Default::default()
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(usize::MAX)
    }

    /// Reject the first `n` reads with a 500.
    pub fn failing_gets(n: usize) -> Arc<Self> {
        Arc::new(Self {
            pod: Mutex::new(pod_json()),
            get_failures_left: AtomicUsize::new(n),
            ..Default::default()
        })
    }

    /// Reads never complete.
    pub fn hanging_gets() -> Arc<Self> {
        Arc::new(Self {
            pod: Mutex::new(pod_json()),
            hang_gets: true,
            ..Default::default()
        })
    }

    /// Another writer sets `condition_type` to `status` right after every read,
    /// before our patch lands.
    pub fn with_write_after_get(self: Arc<Self>, condition_type: &str, status: &str) -> Arc<Self> {
        *self.write_after_get.lock().unwrap() =
            Some((condition_type.to_string(), status.to_string()));
        self
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn patch_calls(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    pub fn last_patch(&self) -> Option<Value> {
        self.last_patch.lock().unwrap().clone()
    }

    pub fn pod(&self) -> Value {
        self.pod.lock().unwrap().clone()
    }

    pub fn condition_status(&self, condition_type: &str) -> Option<String> {
        self.pod()["status"]["conditions"]
            .as_array()?
            .iter()
            .find(|c| c["type"] == condition_type)
            .and_then(|c| c["status"].as_str())
            .map(str::to_string)
    }

    fn apply_conditions(&self, updates: &[Value]) {
        let mut pod = self.pod.lock().unwrap();
        let conditions = pod["status"]["conditions"].as_array_mut().unwrap();
        for update in updates {
            match conditions.iter_mut().find(|c| c["type"] == update["type"]) {
                Some(existing) => {
                    for (key, value) in update.as_object().unwrap() {
                        existing[key] = value.clone();
                    }
                }
                None => conditions.push(update.clone()),
            }
        }
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 500,
        body: "etcdserver: request timed out".to_string(),
    }
}

#[async_trait]
impl PodClient for FakePodClient {
    async fn get_pod(&self, _namespace: &str, _name: &str) -> Result<Value, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_gets {
            std::future::pending::<()>().await;
        }
        if take_failure(&self.get_failures_left) {
            return Err(server_error());
        }
        let pod = self.pod();
        let concurrent = self.write_after_get.lock().unwrap().clone();
        if let Some((condition_type, status)) = concurrent {
            self.apply_conditions(&[json!({"type": condition_type, "status": status})]);
        }
        Ok(pod)
    }

    async fn patch_pod_status(
        &self,
        _namespace: &str,
        _name: &str,
        patch: &Value,
    ) -> Result<(), ApiError> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.patch_failures_left) {
            return Err(server_error());
        }
        if let Some(updates) = patch["status"]["conditions"].as_array() {
            self.apply_conditions(updates);
        }
        *self.last_patch.lock().unwrap() = Some(patch.clone());
        Ok(())
    }
}

pub fn pod_json() -> Value {
    json!({
        "metadata": {"name": POD_NAME, "namespace": POD_NAMESPACE},
        "spec": {"readinessGates": [{"conditionType": DEFAULT_CONDITION_TYPE}]},
        "status": {
            "phase": "Running",
            "conditions": [
                {"type": "Ready", "status": "False"}
            ]
        }
    })
}
