use crate::builder;
use crate::config::ControllerConfig;
use crate::connection;
use crate::crds::{Challenge, ChallengeInstance, ChallengeInstanceStatus, ConditionStatus, Phase};
use crate::error::{Error, Result};
use crate::flag;
use crate::telemetry::Metrics;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::client::Client;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

pub mod expiry;
pub mod resources;

use resources::ensure;

#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub metrics: Arc<Metrics>,
}

/// Single pass over one ChallengeInstance. Every call walks the same
/// ladder: teardown triggers, challenge resolution, flag assignment,
/// resource creation, readiness. Each rung either returns with a requeue
/// or falls through to the next, so a crash at any point is repaired by
/// the following pass.
#[instrument(skip(instance, ctx), fields(instance = %instance.name_any()))]
pub async fn reconcile(instance: Arc<ChallengeInstance>, ctx: Arc<Context>) -> Result<Action> {
    let name = instance.name_any();
    let namespace = instance
        .namespace()
        .ok_or(Error::MissingMetadata("namespace"))?;
    ctx.metrics.record_reconcile();

    // Teardown triggers run before anything else so an expired or solved
    // instance is never provisioned
    if expiry::is_expired(&instance) {
        info!("Instance {} expired, deleting", name);
        ctx.metrics.record_expiry();
        return delete_instance(&instance, &namespace, &ctx).await;
    }

    if instance
        .status
        .as_ref()
        .map(|s| s.flag_validated)
        .unwrap_or(false)
    {
        info!("Flag validated for {}, deleting", name);
        return delete_instance(&instance, &namespace, &ctx).await;
    }

    let challenge = match fetch_challenge(&instance, &namespace, &ctx).await {
        Ok(challenge) => challenge,
        Err(Error::ChallengeNotFound { namespace, name: challenge_name }) => {
            // A missing Challenge is a configuration problem, not a
            // transient fault. Mark the instance failed and wait for a
            // spec change instead of retrying.
            error!(
                "Challenge {}/{} not found, failing instance {}",
                namespace, challenge_name, name
            );
            update_status(&instance, &ctx, |status| {
                status.phase = Some(Phase::Failed);
                status.set_condition(
                    "ChallengeResolved",
                    ConditionStatus::False,
                    "ChallengeNotFound",
                    &format!("Challenge {} does not exist", challenge_name),
                );
            })
            .await?;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    // Flag assignment is its own pass: persist the flag before creating
    // anything that consumes it, so a crash in between can never mint a
    // second flag for the same instance
    if instance
        .status
        .as_ref()
        .map(|s| s.flags.is_empty())
        .unwrap_or(true)
    {
        let generated = flag::generate(
            challenge.spec.scenario.flag_template.as_deref(),
            &name,
            &instance.spec.source_id,
            &instance.spec.challenge_id,
        )?;
        ctx.metrics.record_flag_generated();
        ctx.metrics.incr_active_instances();
        update_status(&instance, &ctx, |status| {
            status.flags = vec![generated];
            status.phase = Some(Phase::Pending);
            status.set_condition(
                "Ready",
                ConditionStatus::Unknown,
                "Provisioning",
                "flag assigned, creating resources",
            );
        })
        .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    let ingresses: Api<Ingress> = Api::namespaced(ctx.client.clone(), &namespace);
    let policies: Api<NetworkPolicy> = Api::namespaced(ctx.client.clone(), &namespace);

    let deployment_name = builder::deployment::deployment_name(&instance);
    let desired = builder::deployment::build(&instance, &challenge)?;
    let deployment = ensure(&deployments, &deployment_name, &desired).await?;

    let service_name = builder::service::service_name(&instance);
    let desired = builder::service::build(&instance, &challenge)?;
    let service = ensure(&services, &service_name, &desired).await?;

    let mut terminal_deployment_name = None;
    if let Some(desired) = builder::terminal::build_deployment(&instance, &challenge)? {
        let tname = builder::terminal::terminal_deployment_name(&instance);
        ensure(&deployments, &tname, &desired).await?;
        terminal_deployment_name = Some(tname);
    }

    let mut terminal_service_name = None;
    if let Some(desired) = builder::terminal::build_service(&instance, &challenge)? {
        let tname = builder::terminal::terminal_service_name(&instance);
        ensure(&services, &tname, &desired).await?;
        terminal_service_name = Some(tname);
    }

    let mut ingress_name = None;
    if let Some(desired) = builder::ingress::build(&instance, &challenge, &ctx.config)? {
        let iname = builder::ingress::ingress_name(&instance);
        ensure(&ingresses, &iname, &desired).await?;
        ingress_name = Some(iname);
    }

    let mut network_policy_name = None;
    if let Some(desired) = builder::network_policy::build(&instance, &challenge)? {
        let pname = builder::network_policy::network_policy_name(&instance);
        ensure(&policies, &pname, &desired).await?;
        network_policy_name = Some(pname);
    }

    // HTTP-routed instances get their connection info from the templated
    // hostname; everything else derives it from the live Service
    let resolved_info = match builder::ingress::hostname(&instance, &challenge, &ctx.config)? {
        Some(host) => Some(connection::from_ingress(
            &host,
            builder::terminal::terminal_enabled(&challenge),
        )),
        None => connection::from_service(service.live(), &ctx.config.node_ip),
    };

    let ready_now = deployment
        .live()
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
        > 0;

    let current = instance.status.clone().unwrap_or_default();
    let names_differ = current.deployment_name.as_deref() != Some(deployment_name.as_str())
        || current.service_name.as_deref() != Some(service_name.as_str())
        || current.terminal_deployment_name != terminal_deployment_name
        || current.terminal_service_name != terminal_service_name
        || current.ingress_name != ingress_name
        || current.network_policy_name != network_policy_name;
    let record_info = resolved_info.is_some()
        && current
            .connection_info
            .as_deref()
            .map(str::is_empty)
            .unwrap_or(true);
    let becomes_ready = ready_now && !(current.ready && current.phase == Some(Phase::Running));

    if names_differ || record_info || becomes_ready {
        update_status(&instance, &ctx, |status| {
            status.deployment_name = Some(deployment_name);
            status.service_name = Some(service_name);
            status.terminal_deployment_name = terminal_deployment_name;
            status.terminal_service_name = terminal_service_name;
            status.ingress_name = ingress_name;
            status.network_policy_name = network_policy_name;
            if becomes_ready {
                // The transition to ready is the one point where existing
                // connection info is refreshed from the live endpoint state
                status.phase = Some(Phase::Running);
                status.ready = true;
                if resolved_info.is_some() {
                    status.connection_info = resolved_info;
                }
                status.set_condition(
                    "Ready",
                    ConditionStatus::True,
                    "WorkloadReady",
                    "challenge workload has ready replicas",
                );
            } else if record_info {
                status.connection_info = resolved_info;
            }
        })
        .await?;
        if becomes_ready {
            info!("Instance {} is ready", name);
        }
    }

    Ok(Action::requeue(ctx.config.reconcile_interval))
}

pub fn error_policy(instance: Arc<ChallengeInstance>, error: &Error, ctx: Arc<Context>) -> Action {
    ctx.metrics.record_error();
    error!("Reconcile of {} failed: {}", instance.name_any(), error);
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(10))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}

async fn fetch_challenge(
    instance: &ChallengeInstance,
    namespace: &str,
    ctx: &Context,
) -> Result<Challenge> {
    let api: Api<Challenge> = Api::namespaced(ctx.client.clone(), namespace);
    api.get_opt(&instance.spec.challenge_name)
        .await?
        .ok_or_else(|| Error::ChallengeNotFound {
            namespace: namespace.to_string(),
            name: instance.spec.challenge_name.clone(),
        })
}

/// Delete the instance itself; the owned resources follow through owner
/// references. A 404 means someone beat us to it, which is fine.
async fn delete_instance(
    instance: &ChallengeInstance,
    namespace: &str,
    ctx: &Context,
) -> Result<Action> {
    let api: Api<ChallengeInstance> = Api::namespaced(ctx.client.clone(), namespace);
    match api.delete(&instance.name_any(), &DeleteParams::default()).await {
        Ok(_) => ctx.metrics.decr_active_instances(),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
        Err(e) => return Err(e.into()),
    }
    Ok(Action::await_change())
}

/// Apply a mutation to a copy of the current status and merge-patch it
/// back through the status subresource.
async fn update_status<F>(instance: &ChallengeInstance, ctx: &Context, mutate: F) -> Result<()>
where
    F: FnOnce(&mut ChallengeInstanceStatus),
{
    let namespace = instance
        .namespace()
        .ok_or(Error::MissingMetadata("namespace"))?;
    let api: Api<ChallengeInstance> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut status = instance.status.clone().unwrap_or_default();
    mutate(&mut status);

    api.patch_status(
        &instance.name_any(),
        &PatchParams::default(),
        &Patch::Merge(status_patch(instance, &status)),
    )
    .await?;
    Ok(())
}

/// Merge-patch body for a status write. The patch serializes the whole
/// status from the reconciler's watch snapshot, so the snapshot's
/// resourceVersion rides along: a write racing a concurrent status
/// update (the gateway flipping `flagValidated`) then conflicts with a
/// 409 and is retried against fresh state instead of clobbering it.
fn status_patch(
    instance: &ChallengeInstance,
    status: &ChallengeInstanceStatus,
) -> serde_json::Value {
    match instance.resource_version() {
        Some(rv) => serde_json::json!({
            "metadata": { "resourceVersion": rv },
            "status": status,
        }),
        None => serde_json::json!({ "status": status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::test_fixtures::instance;

    #[test]
    fn test_status_patch_carries_resource_version() {
        let mut inst = instance();
        inst.metadata.resource_version = Some("42".to_string());

        let mut status = inst.status.clone().unwrap_or_default();
        status.phase = Some(Phase::Pending);

        let patch = status_patch(&inst, &status);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["phase"], "Pending");
    }

    #[test]
    fn test_status_patch_without_resource_version() {
        let patch = status_patch(&instance(), &ChallengeInstanceStatus::default());
        assert!(patch.get("metadata").is_none());
        assert!(patch["status"].is_object());
    }
}
