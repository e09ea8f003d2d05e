use crate::crds::ChallengeInstance;
use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "chall-operator";

pub const INSTANCE_LABEL: &str = "ctf.io/instance";
pub const CHALLENGE_LABEL: &str = "ctf.io/challenge";
pub const SOURCE_LABEL: &str = "ctf.io/source";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

pub const CHALLENGE_COMPONENT: &str = "challenge";
pub const TERMINAL_COMPONENT: &str = "terminal";

/// Make a string safe for use as a label value or hostname fragment.
/// Example: "uwu@uwu.uwu" -> "uwu-at-uwu-uwu"
pub fn sanitize_label(s: &str) -> String {
    let mut result = s
        .to_lowercase()
        .replace('@', "-at-")
        .replace('.', "-");
    // K8s label value limit; cut must land on a char boundary or
    // truncate panics on multibyte input
    if result.len() > 63 {
        let mut end = 63;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }
    result
}

/// Standard labels shared by every resource of one instance
pub fn common_labels(instance: &ChallengeInstance, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), "challenge-instance".to_string());
    labels.insert("app.kubernetes.io/instance".to_string(), instance.name_any());
    labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), component.to_string());
    labels.insert(CHALLENGE_LABEL.to_string(), instance.spec.challenge_id.clone());
    labels.insert(INSTANCE_LABEL.to_string(), instance.name_any());
    labels.insert(SOURCE_LABEL.to_string(), sanitize_label(&instance.spec.source_id));
    labels
}

/// Pod selector for the given component of one instance. Kept minimal and
/// stable: selectors are immutable on Deployments.
pub fn selector_labels(instance: &ChallengeInstance, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(INSTANCE_LABEL.to_string(), instance.name_any());
    labels.insert(COMPONENT_LABEL.to_string(), component.to_string());
    labels
}

/// Controller owner reference linking a resource to its instance, so that
/// deleting the instance cascade-deletes the whole set.
pub fn owner_reference(instance: &ChallengeInstance) -> Result<OwnerReference> {
    instance
        .controller_owner_ref(&())
        .ok_or(Error::MissingMetadata("uid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("uwu@uwu.uwu"), "uwu-at-uwu-uwu");
        assert_eq!(sanitize_label("Team.42"), "team-42");
    }

    #[test]
    fn test_sanitize_label_truncates() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_label(&long).len(), 63);
    }

    #[test]
    fn test_sanitize_label_truncates_multibyte_on_char_boundary() {
        // 2-byte chars put byte 63 mid-character
        let accented = "é".repeat(50);
        let out = sanitize_label(&accented);
        assert!(out.len() <= 63);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
