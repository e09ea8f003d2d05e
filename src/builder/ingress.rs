use crate::builder::labels::{self, sanitize_label, CHALLENGE_COMPONENT};
use crate::builder::service::service_name;
use crate::builder::terminal::{terminal_enabled, terminal_service_name, TERMINAL_SERVICE_PORT};
use crate::config::ControllerConfig;
use crate::crds::{Challenge, ChallengeInstance, ExposeType};
use crate::error::Result;
use crate::template;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use minijinja::context;
use std::collections::BTreeMap;

pub fn ingress_name(instance: &ChallengeInstance) -> String {
    format!("{}-ingress", instance.name_any())
}

/// Render the instance hostname. Returns None when the challenge is not
/// HTTP-routed; template errors are hard failures so a broken template can
/// never leak a wrong hostname into connection info.
pub fn hostname(
    instance: &ChallengeInstance,
    challenge: &Challenge,
    config: &ControllerConfig,
) -> Result<Option<String>> {
    if challenge.spec.scenario.expose_type != ExposeType::Ingress {
        return Ok(None);
    }

    let tmpl = challenge
        .spec
        .scenario
        .ingress
        .as_ref()
        .and_then(|i| i.host_template.as_deref())
        .unwrap_or(&config.host_template);

    let rendered = template::render(
        tmpl,
        context! {
            instance => instance.name_any(),
            source => sanitize_label(&instance.spec.source_id),
            challenge => instance.spec.challenge_id,
        },
    )?;
    Ok(Some(rendered))
}

/// Desired routing rule for an HTTP-routed instance: templated hostname,
/// `/` to the challenge service and, when a terminal exists, a
/// higher-priority `/terminal` path with the prefix rewritten away.
pub fn build(
    instance: &ChallengeInstance,
    challenge: &Challenge,
    config: &ControllerConfig,
) -> Result<Option<Ingress>> {
    let Some(host) = hostname(instance, challenge, config)? else {
        return Ok(None);
    };
    let scenario = &challenge.spec.scenario;
    let ingress_spec = scenario.ingress.as_ref();
    let has_terminal = terminal_enabled(challenge);

    let mut annotations = BTreeMap::new();
    annotations.insert(
        "nginx.ingress.kubernetes.io/ssl-redirect".to_string(),
        "false".to_string(),
    );
    annotations.insert(
        "nginx.ingress.kubernetes.io/proxy-buffer-size".to_string(),
        "16k".to_string(),
    );

    if let Some(auth_url) = &config.auth_url {
        annotations.insert(
            "nginx.ingress.kubernetes.io/auth-url".to_string(),
            format!("http://{}/oauth2/auth", auth_url),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/auth-signin".to_string(),
            format!(
                "http://{}/oauth2/start?rd=$scheme://$host$request_uri",
                auth_url
            ),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/auth-response-headers".to_string(),
            "X-Auth-Request-User,X-Auth-Request-Email,Authorization".to_string(),
        );
    }

    if has_terminal {
        // ttyd needs long-lived websocket connections, and the /terminal
        // prefix is stripped before it reaches the terminal service
        annotations.insert(
            "nginx.ingress.kubernetes.io/proxy-read-timeout".to_string(),
            "3600".to_string(),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/proxy-send-timeout".to_string(),
            "3600".to_string(),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/websocket-services".to_string(),
            terminal_service_name(instance),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/use-regex".to_string(),
            "true".to_string(),
        );
        annotations.insert(
            "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
            "/$2".to_string(),
        );
    }

    if let Some(spec) = ingress_spec {
        if spec.tls {
            if let Some(issuer) = &spec.cluster_issuer {
                annotations.insert("cert-manager.io/cluster-issuer".to_string(), issuer.clone());
            }
        }
        // Challenge-supplied annotations win over defaults
        for (k, v) in &spec.annotations {
            annotations.insert(k.clone(), v.clone());
        }
    }

    let mut paths = Vec::new();

    // The terminal path must come first: with use-regex, path order decides
    // which backend a /terminal request hits
    if has_terminal {
        paths.push(HTTPIngressPath {
            path: Some("/terminal(/|$)(.*)".to_string()),
            path_type: "ImplementationSpecific".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: terminal_service_name(instance),
                    port: Some(ServiceBackendPort {
                        number: Some(TERMINAL_SERVICE_PORT),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
        });
    }

    paths.push(HTTPIngressPath {
        path: Some(if has_terminal {
            // Empty first group keeps $2 = full path under the shared
            // rewrite-target, so challenge sub-paths survive the rewrite
            "/()(.*)".to_string()
        } else {
            "/".to_string()
        }),
        path_type: if has_terminal {
            "ImplementationSpecific".to_string()
        } else {
            "Prefix".to_string()
        },
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service_name(instance),
                port: Some(ServiceBackendPort {
                    number: Some(scenario.port),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    });

    let tls = ingress_spec.filter(|s| s.tls).map(|_| {
        vec![IngressTLS {
            hosts: Some(vec![host.clone()]),
            secret_name: Some(format!("{}-tls", ingress_name(instance))),
        }]
    });

    Ok(Some(Ingress {
        metadata: ObjectMeta {
            name: Some(ingress_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels::common_labels(instance, CHALLENGE_COMPONENT)),
            annotations: Some(annotations),
            owner_references: Some(vec![labels::owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: ingress_spec.and_then(|s| s.class_name.clone()),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    }))
}
