use crate::builder::deployment::{auth_proxy_container, auth_proxy_enabled, identity_env};
use crate::builder::labels::{self, sanitize_label, TERMINAL_COMPONENT};
use crate::builder::service::service_dns;
use crate::crds::{Challenge, ChallengeInstance, TerminalSpec};
use crate::error::Result;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, SecurityContext, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

const DEFAULT_TERMINAL_IMAGE: &str = "ctf-terminal:latest";
const DEFAULT_TTYD_PORT: i32 = 7681;

/// Port the auth proxy listens on when fronting the terminal
pub const AUTH_PROXY_TERMINAL_PORT: i32 = 8888;

/// Stable port the terminal service exposes, referenced by the Ingress
pub const TERMINAL_SERVICE_PORT: i32 = 8080;

pub fn terminal_deployment_name(instance: &ChallengeInstance) -> String {
    format!("{}-terminal", instance.name_any())
}

pub fn terminal_service_name(instance: &ChallengeInstance) -> String {
    format!("{}-terminal-svc", instance.name_any())
}

pub fn terminal_enabled(challenge: &Challenge) -> bool {
    challenge
        .spec
        .scenario
        .terminal
        .as_ref()
        .map(|t| t.enabled)
        .unwrap_or(false)
}

fn ttyd_port(spec: &TerminalSpec) -> i32 {
    spec.port.unwrap_or(DEFAULT_TTYD_PORT)
}

/// Desired web-terminal workload, or None when the Challenge has no
/// terminal. The terminal gets the primary service DNS name so the user
/// can reach the challenge from the shell.
pub fn build_deployment(
    instance: &ChallengeInstance,
    challenge: &Challenge,
) -> Result<Option<Deployment>> {
    let scenario = &challenge.spec.scenario;
    let Some(terminal) = scenario.terminal.as_ref().filter(|t| t.enabled) else {
        return Ok(None);
    };
    let port = ttyd_port(terminal);
    let username = sanitize_label(&instance.spec.source_id);

    let labels = labels::common_labels(instance, TERMINAL_COMPONENT);
    let selector = labels::selector_labels(instance, TERMINAL_COMPONENT);

    let mut containers = Vec::new();

    if let Some(proxy) = scenario.auth_proxy.as_ref().filter(|p| p.enabled) {
        containers.push(auth_proxy_container(
            proxy,
            &instance.spec.source_id,
            AUTH_PROXY_TERMINAL_PORT,
            port,
        ));
    }

    let mut env = vec![
        EnvVar {
            name: "PS1".to_string(),
            value: Some(format!(
                "\\[\\e[1;32m\\]{}@terminal\\[\\e[0m\\]:\\[\\e[1;34m\\]\\w\\[\\e[0m\\]$ ",
                username
            )),
            ..Default::default()
        },
        EnvVar {
            name: "CHALLENGE_HOST".to_string(),
            value: Some(service_dns(instance)),
            ..Default::default()
        },
        EnvVar {
            name: "TTYD_PORT".to_string(),
            value: Some(port.to_string()),
            ..Default::default()
        },
    ];
    env.extend(identity_env(instance));

    containers.push(Container {
        name: "terminal".to_string(),
        image: Some(
            terminal
                .image
                .clone()
                .unwrap_or_else(|| DEFAULT_TERMINAL_IMAGE.to_string()),
        ),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            name: Some("ttyd".to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            run_as_non_root: Some(true),
            run_as_user: Some(1000),
            allow_privilege_escalation: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    });

    Ok(Some(Deployment {
        metadata: ObjectMeta {
            name: Some(terminal_deployment_name(instance)),
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
    }))
}

/// ClusterIP endpoint for the terminal; traffic enters via the auth proxy
/// when one is configured, otherwise straight to ttyd.
pub fn build_service(
    instance: &ChallengeInstance,
    challenge: &Challenge,
) -> Result<Option<Service>> {
    let scenario = &challenge.spec.scenario;
    let Some(terminal) = scenario.terminal.as_ref().filter(|t| t.enabled) else {
        return Ok(None);
    };

    let target_port = if auth_proxy_enabled(scenario.auth_proxy.as_ref()) {
        AUTH_PROXY_TERMINAL_PORT
    } else {
        ttyd_port(terminal)
    };

    Ok(Some(Service {
        metadata: ObjectMeta {
            name: Some(terminal_service_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels::common_labels(instance, TERMINAL_COMPONENT)),
            owner_references: Some(vec![labels::owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels::selector_labels(instance, TERMINAL_COMPONENT)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: TERMINAL_SERVICE_PORT,
                target_port: Some(IntOrString::Int(target_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::test_fixtures::{challenge, instance, with_terminal};
    use crate::crds::AuthProxySpec;

    #[test]
    fn test_disabled_terminal_builds_nothing() {
        assert!(build_deployment(&instance(), &challenge()).unwrap().is_none());
        assert!(build_service(&instance(), &challenge()).unwrap().is_none());
    }

    #[test]
    fn test_terminal_deployment() {
        let chall = with_terminal(challenge());
        let deployment = build_deployment(&instance(), &chall).unwrap().unwrap();
        assert_eq!(deployment.metadata.name.as_deref(), Some("inst-1-terminal"));

        let containers = deployment.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].ports.as_ref().unwrap()[0].container_port, 7681);

        let env = containers[0].env.clone().unwrap();
        let host = env.iter().find(|e| e.name == "CHALLENGE_HOST").unwrap();
        assert_eq!(host.value.as_deref(), Some("inst-1-svc.ctf.svc.cluster.local"));
    }

    #[test]
    fn test_terminal_service_without_proxy_targets_ttyd() {
        let chall = with_terminal(challenge());
        let svc = build_service(&instance(), &chall).unwrap().unwrap();
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.target_port, Some(IntOrString::Int(7681)));
    }

    #[test]
    fn test_terminal_service_with_proxy_targets_proxy() {
        let mut chall = with_terminal(challenge());
        chall.spec.scenario.auth_proxy = Some(AuthProxySpec {
            enabled: true,
            image: None,
        });

        let deployment = build_deployment(&instance(), &chall).unwrap().unwrap();
        let containers = deployment.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "auth-proxy");

        let svc = build_service(&instance(), &chall).unwrap().unwrap();
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.target_port, Some(IntOrString::Int(8888)));
    }
}
