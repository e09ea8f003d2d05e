use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ChallengeInstance is one running occurrence of a Challenge for one
/// source identity (player or team). The spec is owned by whoever created
/// the instance; the status is written exclusively by the reconciler, with
/// the exception of `flagValidated` which the scoring gateway flips.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "ctf.ctf.io",
    version = "v1alpha1",
    kind = "ChallengeInstance",
    plural = "challengeinstances",
    singular = "challengeinstance",
    shortname = "ci",
    namespaced,
    status = "ChallengeInstanceStatus",
    printcolumn = r#"{"name":"Challenge", "type":"string", "jsonPath":".spec.challengeName"}"#,
    printcolumn = r#"{"name":"Source", "type":"string", "jsonPath":".spec.sourceId"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Expires", "type":"date", "jsonPath":".spec.until"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeInstanceSpec {
    /// Challenge identifier (matches Challenge.spec.id)
    pub challenge_id: String,

    /// Opaque user or team identifier
    pub source_id: String,

    /// Name of the Challenge object, resolved in the instance's namespace
    pub challenge_name: String,

    /// Extra key/value context passed through from the request origin
    #[serde(default)]
    pub additional: BTreeMap<String, String>,

    /// Creation time of the request
    pub since: DateTime<Utc>,

    /// Expiry time; unset means the instance never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,

    /// Number of times the instance lifetime has been renewed
    #[serde(default)]
    pub renew_count: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeInstanceStatus {
    /// Current lifecycle phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// True once the primary workload has a ready replica
    #[serde(default)]
    pub ready: bool,

    /// Generated flags; immutable once set
    #[serde(default)]
    pub flags: Vec<String>,

    /// User-facing connection string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<String>,

    /// Names of the concrete resources owned by this instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_deployment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_policy_name: Option<String>,

    /// Set by the gateway when the flag is submitted correctly; triggers
    /// teardown on the next pass regardless of remaining lifetime
    #[serde(default)]
    pub flag_validated: bool,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub enum Phase {
    Pending,
    Running,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ChallengeInstanceStatus {
    /// Set a condition, replacing any previous condition of the same type.
    /// The transition time only moves when the status value changes, so
    /// repeated passes do not flap the status subresource.
    pub fn set_condition(
        &mut self,
        r#type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.r#type == r#type) {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = Some(Utc::now());
            }
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
            return;
        }

        self.conditions.push(Condition {
            r#type: r#type.to_string(),
            status,
            last_transition_time: Some(Utc::now()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_replaces_same_type() {
        let mut status = ChallengeInstanceStatus::default();
        status.set_condition("Ready", ConditionStatus::Unknown, "Waiting", "waiting");
        status.set_condition("Ready", ConditionStatus::True, "AllReady", "pods ready");

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
        assert_eq!(status.conditions[0].reason.as_deref(), Some("AllReady"));
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_unchanged() {
        let mut status = ChallengeInstanceStatus::default();
        status.set_condition("Ready", ConditionStatus::True, "AllReady", "pods ready");
        let first = status.conditions[0].last_transition_time;

        status.set_condition("Ready", ConditionStatus::True, "AllReady", "pods ready");
        assert_eq!(status.conditions[0].last_transition_time, first);
    }
}
