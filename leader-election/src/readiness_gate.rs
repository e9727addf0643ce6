//! Advertise leadership through a pod readiness-gate condition.

use std::sync::Arc;
use std::time::Duration;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{ApiError, Error, Result};
use crate::kube::PodClient;
use crate::metrics;
use crate::pod_condition::{condition_patch, find_condition, reconcile_condition, PodCondition};
use crate::retry::FixedRetryPolicy;

pub const DEFAULT_CONDITION_TYPE: &str = "kubeedge.io/CloudCoreIsLeader";
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

const TRANSITION_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

pub struct ReadinessGatePatcher {
    client: Arc<dyn PodClient>,
    condition_type: String,
    retry: FixedRetryPolicy,
    attempt_timeout: Duration,
}

impl ReadinessGatePatcher {
    pub fn new(client: Arc<dyn PodClient>, condition_type: &str) -> Self {
        Self {
            client,
            condition_type: condition_type.to_string(),
            retry: FixedRetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: FixedRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound on one read-and-patch attempt, both requests included.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Worst-case wall time of `patch_readiness` when every attempt fails.
    pub fn max_duration(&self) -> Duration {
        self.attempt_timeout * self.retry.max_attempts + self.retry.max_total_delay()
    }

    /// Set the leadership condition to `True` on the given pod.
    ///
    /// Skipped (successfully, with no API calls) unless both the pod name and
    /// namespace are known. Each attempt re-reads the pod, so a transient read
    /// failure is retried the same way as a failed patch. Runs to completion or
    /// exhaustion within [`max_duration`](Self::max_duration); it is not
    /// cancellable.
    pub async fn patch_readiness(
        &self,
        pod_name: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<()> {
        let (Some(pod_name), Some(namespace)) = (pod_name, namespace) else {
            info!("not running in a pod, skipping readiness condition patch");
            return Ok(());
        };

        info!(
            namespace,
            pod = pod_name,
            condition = %self.condition_type,
            "running in pod, patching readiness condition"
        );

        let mut attempt = 1;
        loop {
            match self.attempt(namespace, pod_name).await {
                Ok(()) => {
                    metrics::emit_patch_attempt("success");
                    info!(
                        namespace,
                        pod = pod_name,
                        attempt,
                        condition = %self.condition_type,
                        "successfully patched readiness condition"
                    );
                    return Ok(());
                }
                Err(e) => {
                    metrics::emit_patch_attempt("failure");
                    warn!(
                        namespace,
                        pod = pod_name,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "error patching readiness condition"
                    );
                    if !self.retry.should_retry(attempt) {
                        return Err(Error::PatchExhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                }
            }
            tokio::time::sleep(self.retry.delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, namespace: &str, pod_name: &str) -> std::result::Result<(), ApiError> {
        tokio::time::timeout(self.attempt_timeout, self.try_patch(namespace, pod_name))
            .await
            .unwrap_or(Err(ApiError::Timeout(self.attempt_timeout)))
    }

    async fn try_patch(&self, namespace: &str, pod_name: &str) -> std::result::Result<(), ApiError> {
        let pod = self.client.get_pod(namespace, pod_name).await?;

        let existing = find_condition(&pod, &self.condition_type)?;
        let condition = reconcile_condition(
            existing,
            PodCondition::new_true(&self.condition_type),
            &now_rfc3339(),
        );

        let patch = condition_patch(&condition)?;
        self.client
            .patch_pod_status(namespace, pod_name, &patch)
            .await
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(TRANSITION_TIME_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
