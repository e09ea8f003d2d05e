use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Challenge describes how to run one class of instance. It is created by
/// event administrators and is read-only from the controller's perspective;
/// many ChallengeInstances reference one Challenge by name.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "ctf.ctf.io",
    version = "v1alpha1",
    kind = "Challenge",
    plural = "challenges",
    namespaced,
    printcolumn = r#"{"name":"Id", "type":"string", "jsonPath":".spec.id"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.scenario.image"}"#,
    printcolumn = r#"{"name":"Expose", "type":"string", "jsonPath":".spec.scenario.exposeType"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    /// Stable challenge identifier, exposed to instances as CHALLENGE_ID
    pub id: String,

    /// Container scenario to deploy per instance
    pub scenario: ScenarioSpec,

    /// Seconds before an instance of this challenge expires
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    /// Primary container image
    pub image: String,

    /// Port the challenge listens on
    pub port: i32,

    /// How the challenge is reached from outside the cluster
    #[serde(default)]
    pub expose_type: ExposeType,

    /// Static environment for the challenge container. A BTreeMap keeps
    /// builder output byte-identical across passes.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Flag template (`${instance_id}`/`${source_id}`/`${challenge_id}`/`${random}`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_requests: Option<ResourceSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceSpec>,

    /// Identity-verifying reverse proxy placed in front of the challenge
    /// (and the terminal, when present)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_proxy: Option<AuthProxySpec>,

    /// Interactive web terminal deployed next to the challenge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalSpec>,

    /// HTTP routing details, consulted only when exposeType is Ingress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Egress isolation for the terminal pods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicySpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub enum ExposeType {
    /// Reachable inside the cluster only (e.g. from the terminal)
    ClusterIp,
    #[default]
    NodePort,
    LoadBalancer,
    /// HTTP-routed: ClusterIP service plus an Ingress carrying external traffic
    Ingress,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct ResourceSpec {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthProxySpec {
    #[serde(default)]
    pub enabled: bool,

    /// Proxy image; a bundled default is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// ttyd listen port inside the terminal container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Hostname template rendered against `${instance}`, `${source}`
    /// (label-sanitized) and `${challenge}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Extra annotations, merged over the controller defaults
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub tls: bool,

    /// cert-manager issuer for the TLS certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_issuer: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub allow_dns: bool,

    /// Permit egress to public internet ranges (private ranges stay blocked)
    #[serde(default)]
    pub allow_internet: bool,
}

fn default_timeout() -> i64 {
    600
}

fn default_true() -> bool {
    true
}
