use crate::builder::deployment::{auth_proxy_enabled, AUTH_PROXY_CHALLENGE_PORT};
use crate::builder::labels::{self, CHALLENGE_COMPONENT};
use crate::crds::{Challenge, ChallengeInstance, ExposeType};
use crate::error::Result;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

pub fn service_name(instance: &ChallengeInstance) -> String {
    format!("{}-svc", instance.name_any())
}

/// In-cluster DNS name of the primary service, handed to the terminal pod
pub fn service_dns(instance: &ChallengeInstance) -> String {
    format!(
        "{}.{}.svc.cluster.local",
        service_name(instance),
        instance.namespace().unwrap_or_default()
    )
}

/// Desired endpoint for the primary workload. The HTTP-routed mode uses a
/// ClusterIP service and leaves external reachability to the Ingress.
pub fn build(instance: &ChallengeInstance, challenge: &Challenge) -> Result<Service> {
    let scenario = &challenge.spec.scenario;

    let service_type = match scenario.expose_type {
        ExposeType::NodePort => "NodePort",
        ExposeType::LoadBalancer => "LoadBalancer",
        ExposeType::ClusterIp | ExposeType::Ingress => "ClusterIP",
    };

    // With the auth proxy in front, traffic enters through the proxy port
    let target_port = if auth_proxy_enabled(scenario.auth_proxy.as_ref()) {
        AUTH_PROXY_CHALLENGE_PORT
    } else {
        scenario.port
    };

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(service_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels::common_labels(instance, CHALLENGE_COMPONENT)),
            owner_references: Some(vec![labels::owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            selector: Some(labels::selector_labels(instance, CHALLENGE_COMPONENT)),
            ports: Some(vec![ServicePort {
                name: Some("challenge".to_string()),
                port: scenario.port,
                target_port: Some(IntOrString::Int(target_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::test_fixtures::{challenge, instance};
    use crate::crds::AuthProxySpec;

    #[test]
    fn test_node_port_service() {
        let svc = build(&instance(), &challenge()).unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("inst-1-svc"));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));

        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 1337);
        assert_eq!(port.target_port, Some(IntOrString::Int(1337)));
    }

    #[test]
    fn test_ingress_mode_uses_cluster_ip() {
        let mut chall = challenge();
        chall.spec.scenario.expose_type = ExposeType::Ingress;

        let svc = build(&instance(), &chall).unwrap();
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some("ClusterIP"));
    }

    #[test]
    fn test_auth_proxy_redirects_target_port() {
        let mut chall = challenge();
        chall.spec.scenario.auth_proxy = Some(AuthProxySpec {
            enabled: true,
            image: None,
        });

        let svc = build(&instance(), &chall).unwrap();
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 1337);
        assert_eq!(port.target_port, Some(IntOrString::Int(80)));
    }

    #[test]
    fn test_selector_targets_instance_pods() {
        let svc = build(&instance(), &challenge()).unwrap();
        let selector = svc.spec.unwrap().selector.unwrap();
        assert_eq!(selector.get("ctf.io/instance").map(String::as_str), Some("inst-1"));
    }

    #[test]
    fn test_service_dns() {
        assert_eq!(service_dns(&instance()), "inst-1-svc.ctf.svc.cluster.local");
    }
}
