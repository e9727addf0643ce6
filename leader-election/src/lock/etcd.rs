//! etcd-backed resource lock.
//!
//! The lock object is a single etcd key claimed by a compare-and-swap
//! transaction and bound to an etcd lease. The holder keeps the lease alive;
//! if it stops (crash, partition, renewal deadline exceeded) etcd deletes the
//! key when the lease expires and the next candidate's CAS succeeds.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, LeaseKeepAliveStream, LeaseKeeper, PutOptions, Txn, TxnOp,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{LeadershipListener, LockProvider, LockReference, ResourceLock, TimingPolicy};
use crate::error::LockError;
use crate::identity::ElectionIdentity;

/// Written to the lock key when leadership is acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    pub holder_identity: String,
    pub lease_id: i64,
    pub lease_duration_secs: i64,
    pub acquired_at: i64,
}

#[derive(Clone)]
pub struct EtcdLockProvider {
    client: Client,
    prefix: String,
}

impl EtcdLockProvider {
    pub async fn connect(endpoints: &[String], prefix: &str) -> Result<Self, LockError> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self::from_client(client, prefix))
    }

    pub fn from_client(client: Client, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    pub fn lock_key(&self, reference: &LockReference) -> String {
        format!(
            "{}{}/{}/{}",
            self.prefix, reference.lock_kind, reference.namespace, reference.name
        )
    }

    /// Read the current holder of a lock (if any).
    pub async fn current_holder(
        &self,
        reference: &LockReference,
    ) -> Result<Option<LeaderRecord>, LockError> {
        let resp = self
            .client
            .clone()
            .get(self.lock_key(reference), None)
            .await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_slice(kv.value())?)),
            None => Ok(None),
        }
    }
}

impl LockProvider for EtcdLockProvider {
    fn new_lock(
        &self,
        reference: &LockReference,
        identity: &ElectionIdentity,
    ) -> Result<Arc<dyn ResourceLock>, LockError> {
        reference.validate()?;
        Ok(Arc::new(EtcdLock {
            client: self.client.clone(),
            key: self.lock_key(reference),
            identity: identity.to_string(),
        }))
    }
}

pub struct EtcdLock {
    client: Client,
    key: String,
    identity: String,
}

#[async_trait]
impl ResourceLock for EtcdLock {
    fn describe(&self) -> String {
        format!("etcd:{}", self.key)
    }

    async fn run(
        &self,
        timing: TimingPolicy,
        listener: Arc<dyn LeadershipListener>,
        cancel: CancellationToken,
    ) {
        loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.try_acquire(&timing) => result,
            };

            match attempt {
                Ok(Some(lease_id)) => {
                    self.lead(lease_id, timing, listener, cancel).await;
                    return;
                }
                Ok(None) => {
                    tracing::debug!(identity = %self.identity, key = %self.key, "another candidate is leader, standing by");
                }
                Err(e) => {
                    tracing::warn!(identity = %self.identity, key = %self.key, error = %e, "failed to acquire lock");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(timing.retry_period) => {}
            }
        }
    }
}

impl EtcdLock {
    /// Grant a lease and CAS the key. Returns the lease id when the claim won.
    async fn try_acquire(&self, timing: &TimingPolicy) -> Result<Option<i64>, LockError> {
        let ttl = timing.lease_duration.as_secs().max(1) as i64;
        let lease_id = self.client.clone().lease_grant(ttl, None).await?.id();

        let record = LeaderRecord {
            holder_identity: self.identity.clone(),
            lease_id,
            lease_duration_secs: ttl,
            acquired_at: now_seconds(),
        };
        let value = serde_json::to_vec(&record)?;

        // Only succeed if the key does not exist (version == 0)
        let txn = Txn::new()
            .when(vec![Compare::version(self.key.as_str(), CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(
                self.key.as_str(),
                value,
                Some(PutOptions::new().with_lease(lease_id)),
            )]);

        let resp = self.client.clone().txn(txn).await?;
        if !resp.succeeded() {
            // Best-effort revoke so the unused lease doesn't linger
            drop(self.client.clone().lease_revoke(lease_id).await);
            return Ok(None);
        }
        Ok(Some(lease_id))
    }

    /// Hold leadership until renewal fails or `cancel` fires. The lease is left
    /// to expire rather than revoked.
    async fn lead(
        &self,
        lease_id: i64,
        timing: TimingPolicy,
        listener: Arc<dyn LeadershipListener>,
        cancel: CancellationToken,
    ) {
        tracing::info!(identity = %self.identity, key = %self.key, lease_id, "acquired leadership");

        let leadership = cancel.child_token();
        let keepalive_handle = {
            let client = self.client.clone();
            let token = leadership.clone();
            tokio::spawn(async move {
                if let Err(e) = run_lease_keepalive(client, lease_id, timing, token.clone()).await {
                    tracing::error!(lease_id, error = %e, "lease renewal failed, cancelling leadership");
                }
                token.cancel();
            })
        };

        listener.on_acquire(leadership.clone()).await;

        leadership.cancelled().await;
        drop(keepalive_handle.await);

        if cancel.is_cancelled() {
            tracing::info!(identity = %self.identity, key = %self.key, "stepping down, election cancelled");
        } else {
            tracing::warn!(identity = %self.identity, key = %self.key, "stopped leading");
        }
        listener.on_lose().await;
    }
}

/// Tracks how long the holder has gone without a successful renewal.
#[derive(Debug, Clone, Copy)]
struct RenewalDeadline {
    last_renewed: Instant,
    deadline: Duration,
}

impl RenewalDeadline {
    fn new(now: Instant, deadline: Duration) -> Self {
        Self {
            last_renewed: now,
            deadline,
        }
    }

    fn renewed(&mut self, now: Instant) {
        self.last_renewed = now;
    }

    /// Time left before the holder must give up; zero once expired.
    fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .saturating_sub(now.saturating_duration_since(self.last_renewed))
    }

    fn expired(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }
}

type KeepAlive = (LeaseKeeper, LeaseKeepAliveStream);

/// Renew every `retry_period`. Failed renewals are retried, reopening the
/// keepalive stream, until `renew_deadline` has passed since the last success.
/// An expired lease ends leadership immediately.
async fn run_lease_keepalive(
    mut client: Client,
    lease_id: i64,
    timing: TimingPolicy,
    cancel: CancellationToken,
) -> Result<(), LockError> {
    let mut keepalive: Option<KeepAlive> = None;
    let mut deadline = RenewalDeadline::new(Instant::now(), timing.renew_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(timing.retry_period) => {}
        }

        let remaining = deadline.remaining(Instant::now());
        match tokio::time::timeout(remaining, renew_once(&mut client, &mut keepalive, lease_id))
            .await
        {
            Ok(Ok(())) => deadline.renewed(Instant::now()),
            Ok(Err(LockError::LeadershipLost)) => return Err(LockError::LeadershipLost),
            Ok(Err(e)) => {
                tracing::warn!(lease_id, error = %e, "lease renewal failed, retrying");
                keepalive = None;
            }
            Err(_) => {
                tracing::warn!(lease_id, "lease renewal timed out, retrying");
                keepalive = None;
            }
        }

        if deadline.expired(Instant::now()) {
            return Err(LockError::LeadershipLost);
        }
    }
}

async fn renew_once(
    client: &mut Client,
    keepalive: &mut Option<KeepAlive>,
    lease_id: i64,
) -> Result<(), LockError> {
    if keepalive.is_none() {
        *keepalive = Some(client.lease_keep_alive(lease_id).await?);
    }
    let Some((keeper, stream)) = keepalive.as_mut() else {
        return Err(LockError::KeepAliveClosed);
    };

    keeper.keep_alive().await?;
    match stream.message().await? {
        // A zero TTL means the lease already expired
        Some(resp) if resp.ttl() > 0 => Ok(()),
        Some(_) => Err(LockError::LeadershipLost),
        None => Err(LockError::KeepAliveClosed),
    }
}

fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
