//! Pod status conditions and the strategic merge patch that sets one of them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ApiError;

pub const CONDITION_TRUE: &str = "True";

/// A pod status condition as stored in `status.conditions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fields this code does not model are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PodCondition {
    pub fn new_true(condition_type: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: CONDITION_TRUE.to_string(),
            last_transition_time: None,
            reason: None,
            message: None,
            extra: Map::new(),
        }
    }
}

/// The condition of `condition_type` currently in `status.conditions`, if any.
pub fn find_condition(pod: &Value, condition_type: &str) -> Result<Option<PodCondition>, ApiError> {
    if !pod.is_object() {
        return Err(ApiError::MalformedPod("pod is not a JSON object".to_string()));
    }
    let conditions = match pod.get("status").and_then(|s| s.get("conditions")) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(conditions)) => conditions,
        Some(_) => {
            return Err(ApiError::MalformedPod(
                "status.conditions is not an array".to_string(),
            ))
        }
    };

    conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        .map(|c| serde_json::from_value(c.clone()))
        .transpose()
        .map_err(ApiError::from)
}

/// Fold `desired` over the existing condition of the same type.
///
/// The transition time is set to `now` when the condition is new or its
/// status changes, and carried over otherwise. Fields this code does not
/// model are carried over from the existing condition.
pub fn reconcile_condition(
    existing: Option<PodCondition>,
    mut desired: PodCondition,
    now: &str,
) -> PodCondition {
    desired.last_transition_time = Some(now.to_string());
    if let Some(old) = existing {
        if old.status == desired.status {
            desired.last_transition_time = old.last_transition_time;
        }
        if desired.extra.is_empty() {
            desired.extra = old.extra;
        }
    }
    desired
}

/// Strategic merge patch for the status subresource carrying only `condition`.
///
/// `status.conditions` merges on `type` server-side, so conditions owned by
/// other writers (the kubelet's `Ready`, `ContainersReady`) are never resent.
pub fn condition_patch(condition: &PodCondition) -> Result<Value, ApiError> {
    Ok(json!({
        "status": {
            "conditions": [serde_json::to_value(condition)?]
        }
    }))
}
