use std::time::Duration;

use envconfig::Envconfig;

use crate::coordinator::PodTarget;
use crate::error::ConfigError;
use crate::kube::KubeClientConfig;
use crate::lock::{LockReference, ResourceLockKind, TimingPolicy};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // ── Lock object ─────────────────────────────────────────────────
    #[envconfig(default = "leases")]
    pub resource_lock_type: ResourceLockKind,

    #[envconfig(default = "kubeedge")]
    pub resource_namespace: String,

    #[envconfig(default = "cloudcorelease")]
    pub resource_name: String,

    #[envconfig(default = "cloudcore")]
    pub election_name: String,

    // ── Lease timing ────────────────────────────────────────────────
    #[envconfig(default = "15")]
    pub lease_duration_secs: u64,

    #[envconfig(default = "10")]
    pub renew_deadline_secs: u64,

    #[envconfig(default = "2")]
    pub retry_period_secs: u64,

    #[envconfig(default = "30")]
    pub module_shutdown_timeout_secs: u64,

    // ── etcd ────────────────────────────────────────────────────────
    #[envconfig(default = "http://localhost:2379")]
    pub etcd_endpoints: String,

    #[envconfig(default = "/leader-election/")]
    pub etcd_prefix: String,

    // ── Pod readiness gate ──────────────────────────────────────────
    #[envconfig(from = "POD_NAME")]
    pub pod_name: Option<String>,

    #[envconfig(from = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,

    #[envconfig(default = "kubeedge.io/CloudCoreIsLeader")]
    pub readiness_condition_type: String,

    #[envconfig(default = "2")]
    pub readiness_attempt_timeout_secs: u64,

    pub kube_api_url: Option<String>,

    #[envconfig(default = "/var/run/secrets/kubernetes.io/serviceaccount/token")]
    pub kube_token_path: String,

    #[envconfig(default = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt")]
    pub kube_ca_path: String,

    #[envconfig(default = "10")]
    pub kube_request_timeout_secs: u64,

    // ── HTTP server ─────────────────────────────────────────────────
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "10550")]
    pub port: u16,

    #[envconfig(default = "false")]
    pub debug: bool,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn etcd_endpoint_list(&self) -> Vec<String> {
        self.etcd_endpoints
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn timing_policy(&self) -> Result<TimingPolicy, ConfigError> {
        TimingPolicy::new(
            Duration::from_secs(self.lease_duration_secs),
            Duration::from_secs(self.renew_deadline_secs),
            Duration::from_secs(self.retry_period_secs),
        )
    }

    pub fn lock_reference(&self) -> LockReference {
        LockReference {
            lock_kind: self.resource_lock_type,
            namespace: self.resource_namespace.clone(),
            name: self.resource_name.clone(),
        }
    }

    /// Empty values count as unset, matching how the downward API behaves
    /// when a field is not wired up.
    pub fn pod_target(&self) -> PodTarget {
        PodTarget {
            name: non_empty(&self.pod_name),
            namespace: non_empty(&self.pod_namespace),
        }
    }

    pub fn kube_client_config(&self) -> KubeClientConfig {
        KubeClientConfig {
            api_url: non_empty(&self.kube_api_url),
            token_path: self.kube_token_path.clone(),
            ca_path: self.kube_ca_path.clone(),
            request_timeout: Duration::from_secs(self.kube_request_timeout_secs),
        }
    }

    pub fn readiness_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_attempt_timeout_secs)
    }

    pub fn module_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.module_shutdown_timeout_secs)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
