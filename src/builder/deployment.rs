use crate::builder::labels::{self, CHALLENGE_COMPONENT};
use crate::crds::{AuthProxySpec, Challenge, ChallengeInstance, ResourceSpec};
use crate::error::Result;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

const DEFAULT_AUTH_PROXY_IMAGE: &str = "ctf-auth-proxy:latest";

/// Port the auth proxy listens on when fronting the challenge container
pub const AUTH_PROXY_CHALLENGE_PORT: i32 = 80;

pub fn deployment_name(instance: &ChallengeInstance) -> String {
    format!("{}-deployment", instance.name_any())
}

/// Desired primary workload: one replica running the challenge container,
/// with the identity-verifying proxy prepended when the Challenge asks for it.
pub fn build(instance: &ChallengeInstance, challenge: &Challenge) -> Result<Deployment> {
    let scenario = &challenge.spec.scenario;
    let labels = labels::common_labels(instance, CHALLENGE_COMPONENT);
    let selector = labels::selector_labels(instance, CHALLENGE_COMPONENT);

    let mut env: Vec<EnvVar> = scenario
        .environment
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    // The reconciler assigns the flag before building any resource, but
    // guard anyway so a flagless instance still deploys
    if let Some(flag) = instance.status.as_ref().and_then(|s| s.flags.first()) {
        env.push(EnvVar {
            name: "FLAG".to_string(),
            value: Some(flag.clone()),
            ..Default::default()
        });
    }

    env.extend(identity_env(instance));

    let mut containers = Vec::new();

    if let Some(proxy) = scenario.auth_proxy.as_ref().filter(|p| p.enabled) {
        containers.push(auth_proxy_container(
            proxy,
            &instance.spec.source_id,
            AUTH_PROXY_CHALLENGE_PORT,
            scenario.port,
        ));
    }

    containers.push(Container {
        name: "challenge".to_string(),
        image: Some(scenario.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("challenge".to_string()),
            container_port: scenario.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        resources: resource_requirements(
            scenario.resource_requests.as_ref(),
            scenario.resource_limits.as_ref(),
        ),
        ..Default::default()
    });

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![labels::owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    automount_service_account_token: Some(false),
                    enable_service_links: Some(false),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// INSTANCE_ID / SOURCE_ID / CHALLENGE_ID, shared with the terminal pod
pub fn identity_env(instance: &ChallengeInstance) -> Vec<EnvVar> {
    [
        ("INSTANCE_ID", instance.name_any()),
        ("SOURCE_ID", instance.spec.source_id.clone()),
        ("CHALLENGE_ID", instance.spec.challenge_id.clone()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    })
    .collect()
}

pub fn auth_proxy_enabled(spec: Option<&AuthProxySpec>) -> bool {
    spec.map(|p| p.enabled).unwrap_or(false)
}

/// Sidecar that verifies the caller's identity and forwards to the
/// upstream port on localhost.
pub fn auth_proxy_container(
    spec: &AuthProxySpec,
    source_id: &str,
    listen_port: i32,
    target_port: i32,
) -> Container {
    Container {
        name: "auth-proxy".to_string(),
        image: Some(
            spec.image
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTH_PROXY_IMAGE.to_string()),
        ),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            EnvVar {
                name: "ALLOWED_USER".to_string(),
                value: Some(source_id.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "LISTEN_PORT".to_string(),
                value: Some(listen_port.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "TARGET_PORT".to_string(),
                value: Some(target_port.to_string()),
                ..Default::default()
            },
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: listen_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn resource_requirements(
    requests: Option<&ResourceSpec>,
    limits: Option<&ResourceSpec>,
) -> Option<ResourceRequirements> {
    if requests.is_none() && limits.is_none() {
        return None;
    }

    Some(ResourceRequirements {
        requests: requests.map(quantities),
        limits: limits.map(quantities),
        ..Default::default()
    })
}

fn quantities(spec: &ResourceSpec) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &spec.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::test_fixtures::{challenge, instance};

    #[test]
    fn test_build_basic_deployment() {
        let inst = instance();
        let chall = challenge();

        let deployment = build(&inst, &chall).unwrap();
        assert_eq!(deployment.metadata.name.as_deref(), Some("inst-1-deployment"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("ctf"));

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));

        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].image.as_deref(), Some("nginx:alpine"));
        assert_eq!(containers[0].ports.as_ref().unwrap()[0].container_port, 1337);
    }

    #[test]
    fn test_env_contains_flag_and_identity() {
        let mut inst = instance();
        inst.status.as_mut().unwrap().flags = vec!["FLAG{test}".to_string()];

        let deployment = build(&inst, &challenge()).unwrap();
        let env = deployment.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        let get = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(get("FLAG").as_deref(), Some("FLAG{test}"));
        assert_eq!(get("INSTANCE_ID").as_deref(), Some("inst-1"));
        assert_eq!(get("SOURCE_ID").as_deref(), Some("user@example.com"));
        assert_eq!(get("CHALLENGE_ID").as_deref(), Some("chall-1"));
        assert_eq!(get("CUSTOM_VAR").as_deref(), Some("custom-value"));
    }

    #[test]
    fn test_auth_proxy_sidecar_is_prepended() {
        let mut chall = challenge();
        chall.spec.scenario.auth_proxy = Some(crate::crds::AuthProxySpec {
            enabled: true,
            image: None,
        });

        let deployment = build(&instance(), &chall).unwrap();
        let containers = deployment.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "auth-proxy");

        let env = containers[0].env.clone().unwrap();
        let target = env.iter().find(|e| e.name == "TARGET_PORT").unwrap();
        assert_eq!(target.value.as_deref(), Some("1337"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let inst = instance();
        let chall = challenge();

        let a = serde_json::to_vec(&build(&inst, &chall).unwrap()).unwrap();
        let b = serde_json::to_vec(&build(&inst, &chall).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_owner_reference_is_set() {
        let deployment = build(&instance(), &challenge()).unwrap();
        let owners = deployment.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "ChallengeInstance");
        assert_eq!(owners[0].name, "inst-1");
        assert_eq!(owners[0].controller, Some(true));
    }
}
