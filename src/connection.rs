//! Derives the user-facing connection string from observed endpoint state.
//!
//! Returns `None` while the cluster has not yet assigned the piece of
//! information the exposure mode depends on (node port, load-balancer
//! address); the reconciler keeps polling until it resolves.

use k8s_openapi::api::core::v1::Service;

/// Resolve a connection string from a live Service.
///
/// NodePort: `nc <node_ip> <assigned_port>` once the node port exists.
/// LoadBalancer: `nc <ip-or-hostname> <port>` once an address is assigned.
/// ClusterIP: the in-cluster DNS name, reachable from the terminal pod.
pub fn from_service(service: &Service, node_ip: &str) -> Option<String> {
    let spec = service.spec.as_ref()?;
    let port = spec.ports.as_ref()?.first()?;

    match spec.type_.as_deref() {
        Some("NodePort") => {
            let node_port = port.node_port.filter(|p| *p > 0)?;
            Some(format!("nc {} {}", node_ip, node_port))
        }
        Some("LoadBalancer") => {
            let ingress = service
                .status
                .as_ref()?
                .load_balancer
                .as_ref()?
                .ingress
                .as_ref()?
                .first()?;
            let host = ingress
                .ip
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(ingress.hostname.as_deref().filter(|s| !s.is_empty()))?;
            Some(format!("nc {} {}", host, port.port))
        }
        _ => {
            let name = service.metadata.name.as_deref()?;
            let namespace = service.metadata.namespace.as_deref()?;
            Some(format!(
                "{}.{}.svc.cluster.local:{}",
                name, namespace, port.port
            ))
        }
    }
}

/// Format connection info for an HTTP-routed instance. When a terminal
/// workload exists a second line points at the stripped `/terminal` prefix.
pub fn from_ingress(hostname: &str, has_terminal: bool) -> String {
    if has_terminal {
        format!(
            "Challenge: http://{}\nTerminal: http://{}/terminal",
            hostname, hostname
        )
    } else {
        format!("http://{}", hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, ServicePort, ServiceSpec, ServiceStatus,
    };
    use kube::api::ObjectMeta;

    fn service(type_: &str, port: i32, node_port: Option<i32>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("inst-1-svc".to_string()),
                namespace: Some("ctf".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                ports: Some(vec![ServicePort {
                    port,
                    node_port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_port_unassigned_is_none() {
        assert_eq!(from_service(&service("NodePort", 1337, None), "10.0.0.1"), None);
    }

    #[test]
    fn test_node_port_assigned() {
        let svc = service("NodePort", 1337, Some(30042));
        assert_eq!(
            from_service(&svc, "10.0.0.1"),
            Some("nc 10.0.0.1 30042".to_string())
        );
    }

    #[test]
    fn test_load_balancer_pending_is_none() {
        assert_eq!(from_service(&service("LoadBalancer", 1337, None), "x"), None);
    }

    #[test]
    fn test_load_balancer_ip() {
        let mut svc = service("LoadBalancer", 1337, None);
        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some("203.0.113.9".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(
            from_service(&svc, "x"),
            Some("nc 203.0.113.9 1337".to_string())
        );
    }

    #[test]
    fn test_load_balancer_hostname_fallback() {
        let mut svc = service("LoadBalancer", 1337, None);
        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    hostname: Some("lb.example.com".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(
            from_service(&svc, "x"),
            Some("nc lb.example.com 1337".to_string())
        );
    }

    #[test]
    fn test_cluster_ip_internal_dns() {
        let svc = service("ClusterIP", 1337, None);
        assert_eq!(
            from_service(&svc, "x"),
            Some("inst-1-svc.ctf.svc.cluster.local:1337".to_string())
        );
    }

    #[test]
    fn test_ingress_formats() {
        assert_eq!(from_ingress("a.ctf.local", false), "http://a.ctf.local");
        assert_eq!(
            from_ingress("a.ctf.local", true),
            "Challenge: http://a.ctf.local\nTerminal: http://a.ctf.local/terminal"
        );
    }
}
