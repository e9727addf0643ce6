//! Lock service boundary: what the coordinator needs from a distributed lock,
//! independent of the backend that implements it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, LockError};
use crate::identity::ElectionIdentity;

pub mod etcd;

/// Kind of object backing the lock, named as in Kubernetes resource locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLockKind {
    Leases,
    Endpoints,
    ConfigMaps,
    EndpointsLeases,
    ConfigMapsLeases,
}

impl ResourceLockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLockKind::Leases => "leases",
            ResourceLockKind::Endpoints => "endpoints",
            ResourceLockKind::ConfigMaps => "configmaps",
            ResourceLockKind::EndpointsLeases => "endpointsleases",
            ResourceLockKind::ConfigMapsLeases => "configmapsleases",
        }
    }
}

impl std::str::FromStr for ResourceLockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "leases" => Ok(ResourceLockKind::Leases),
            "endpoints" => Ok(ResourceLockKind::Endpoints),
            "configmaps" => Ok(ResourceLockKind::ConfigMaps),
            "endpointsleases" => Ok(ResourceLockKind::EndpointsLeases),
            "configmapsleases" => Ok(ResourceLockKind::ConfigMapsLeases),
            _ => Err(format!("Unknown resource lock type: {s}")),
        }
    }
}

impl fmt::Display for ResourceLockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names the shared object used as the lock. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReference {
    pub lock_kind: ResourceLockKind,
    pub namespace: String,
    pub name: String,
}

impl LockReference {
    pub fn validate(&self) -> Result<(), LockError> {
        validate_identifier(&self.namespace)?;
        validate_identifier(&self.name)
    }
}

impl fmt::Display for LockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lock_kind, self.namespace, self.name)
    }
}

/// Lease timing handed to the lock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    /// How long a claim stays valid without renewal.
    pub lease_duration: Duration,
    /// How long the holder keeps retrying renewal before giving up leadership.
    pub renew_deadline: Duration,
    /// How often renewal and acquisition attempts are made.
    pub retry_period: Duration,
}

impl TimingPolicy {
    /// Build a policy, enforcing `retry_period < renew_deadline < lease_duration`.
    pub fn new(
        lease_duration: Duration,
        renew_deadline: Duration,
        retry_period: Duration,
    ) -> Result<Self, ConfigError> {
        if retry_period.is_zero() {
            return Err(ConfigError::Timing("retry period must be positive".to_string()));
        }
        if renew_deadline >= lease_duration {
            return Err(ConfigError::Timing(format!(
                "renew deadline ({renew_deadline:?}) must be shorter than lease duration ({lease_duration:?})"
            )));
        }
        if retry_period >= renew_deadline {
            return Err(ConfigError::Timing(format!(
                "retry period ({retry_period:?}) must be shorter than renew deadline ({renew_deadline:?})"
            )));
        }
        Ok(Self {
            lease_duration,
            renew_deadline,
            retry_period,
        })
    }
}

/// Leadership-change notifications, invoked serially by the lock service.
#[async_trait]
pub trait LeadershipListener: Send + Sync {
    /// This process now holds the lock. `ctx` is cancelled when leadership ends.
    async fn on_acquire(&self, ctx: CancellationToken);

    /// This process no longer holds the lock, whatever the underlying cause.
    async fn on_lose(&self);
}

/// A claim on one lock object under one identity.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Campaign for the lock until leadership is held and then lost, or until
    /// `cancel` fires. Backend errors never escape: they surface as `on_lose`.
    async fn run(
        &self,
        timing: TimingPolicy,
        listener: Arc<dyn LeadershipListener>,
        cancel: CancellationToken,
    );
}

/// Constructs resource locks for a backend.
pub trait LockProvider: Send + Sync {
    fn new_lock(
        &self,
        reference: &LockReference,
        identity: &ElectionIdentity,
    ) -> Result<Arc<dyn ResourceLock>, LockError>;
}

/// Validate that an identifier is safe for use in lock key paths.
///
/// Namespaces and names are interpolated into backend keys. Without
/// validation, a name like `../../other/lock` could address arbitrary keys.
pub fn validate_identifier(name: &str) -> Result<(), LockError> {
    if name.is_empty() || name.len() > 253 {
        return Err(LockError::InvalidReference(
            "identifier must be 1-253 characters".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(LockError::InvalidReference(format!(
            "identifier {name:?} contains invalid characters (only alphanumeric, dash, underscore, dot allowed)"
        )));
    }
    if name.contains("..") {
        return Err(LockError::InvalidReference(format!(
            "identifier {name:?} must not contain '..'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn lock_kind_parses_case_insensitively() {
        assert_eq!(
            "Leases".parse::<ResourceLockKind>().unwrap(),
            ResourceLockKind::Leases
        );
        assert_eq!(
            " endpointsleases ".parse::<ResourceLockKind>().unwrap(),
            ResourceLockKind::EndpointsLeases
        );
        assert_eq!(
            "CONFIGMAPS".parse::<ResourceLockKind>().unwrap(),
            ResourceLockKind::ConfigMaps
        );
        assert!("zookeeper".parse::<ResourceLockKind>().is_err());
    }

    #[test]
    fn timing_policy_accepts_ordered_durations() {
        let timing = TimingPolicy::new(secs(15), secs(10), secs(2)).unwrap();
        assert_eq!(timing.lease_duration, secs(15));
        assert_eq!(timing.renew_deadline, secs(10));
        assert_eq!(timing.retry_period, secs(2));
    }

    #[test]
    fn timing_policy_rejects_renew_deadline_at_or_above_lease() {
        assert!(TimingPolicy::new(secs(10), secs(10), secs(2)).is_err());
        assert!(TimingPolicy::new(secs(10), secs(12), secs(2)).is_err());
    }

    #[test]
    fn timing_policy_rejects_retry_at_or_above_renew_deadline() {
        assert!(TimingPolicy::new(secs(15), secs(10), secs(10)).is_err());
        assert!(TimingPolicy::new(secs(15), secs(10), Duration::ZERO).is_err());
    }

    #[test]
    fn validate_identifier_accepts_valid() {
        for name in ["kubeedge", "cloudcorelease", "kube-system", "a.b_c-1"] {
            assert!(validate_identifier(name).is_ok(), "should accept: {name}");
        }
    }

    #[test]
    fn validate_identifier_rejects_empty_and_too_long() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(&"a".repeat(254)).is_err());
    }

    #[test]
    fn validate_identifier_rejects_path_traversal() {
        for name in ["../../etc", "foo/bar", "a..b", "hello world"] {
            assert!(validate_identifier(name).is_err(), "should reject: {name}");
        }
    }

    #[test]
    fn lock_reference_display() {
        let reference = LockReference {
            lock_kind: ResourceLockKind::Leases,
            namespace: "kubeedge".to_string(),
            name: "cloudcorelease".to_string(),
        };
        assert_eq!(reference.to_string(), "leases/kubeedge/cloudcorelease");
        assert!(reference.validate().is_ok());
    }
}
