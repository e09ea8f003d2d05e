use crate::builder::labels::{self, CHALLENGE_COMPONENT, COMPONENT_LABEL, INSTANCE_LABEL, TERMINAL_COMPONENT};
use crate::builder::terminal::terminal_enabled;
use crate::crds::{Challenge, ChallengeInstance};
use crate::error::Result;
use k8s_openapi::api::networking::v1::{
    IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

pub fn network_policy_name(instance: &ChallengeInstance) -> String {
    format!("{}-netpol", instance.name_any())
}

/// Egress-only isolation for the terminal pods. The rule set is a
/// whitelist: DNS, the paired challenge of the same instance, and
/// optionally the public internet with private ranges carved out.
/// Anything not matched by a rule is denied by the policy's existence.
pub fn build(instance: &ChallengeInstance, challenge: &Challenge) -> Result<Option<NetworkPolicy>> {
    if !terminal_enabled(challenge) {
        return Ok(None);
    }
    let Some(policy) = challenge.spec.scenario.network_policy.as_ref() else {
        return Ok(None);
    };
    if !policy.enabled {
        return Ok(None);
    }

    let mut egress = Vec::new();

    if policy.allow_dns {
        let port53 = IntOrString::Int(53);
        egress.push(NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                namespace_selector: Some(LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "kubernetes.io/metadata.name".to_string(),
                        "kube-system".to_string(),
                    )])),
                    ..Default::default()
                }),
                pod_selector: Some(LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "k8s-app".to_string(),
                        "kube-dns".to_string(),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ports: Some(vec![
                NetworkPolicyPort {
                    protocol: Some("UDP".to_string()),
                    port: Some(port53.clone()),
                    ..Default::default()
                },
                NetworkPolicyPort {
                    protocol: Some("TCP".to_string()),
                    port: Some(port53),
                    ..Default::default()
                },
            ]),
        });
    }

    // The challenge pods of this same instance
    egress.push(NetworkPolicyEgressRule {
        to: Some(vec![NetworkPolicyPeer {
            pod_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([
                    (INSTANCE_LABEL.to_string(), instance.name_any()),
                    (COMPONENT_LABEL.to_string(), CHALLENGE_COMPONENT.to_string()),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    });

    if policy.allow_internet {
        egress.push(NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                ip_block: Some(IPBlock {
                    cidr: "0.0.0.0/0".to_string(),
                    except: Some(vec![
                        "10.0.0.0/8".to_string(),
                        "172.16.0.0/12".to_string(),
                        "192.168.0.0/16".to_string(),
                    ]),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    Ok(Some(NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(network_policy_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels::common_labels(instance, TERMINAL_COMPONENT)),
            owner_references: Some(vec![labels::owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(labels::selector_labels(instance, TERMINAL_COMPONENT)),
                ..Default::default()
            },
            policy_types: Some(vec!["Egress".to_string()]),
            egress: Some(egress),
            ..Default::default()
        }),
    }))
}
