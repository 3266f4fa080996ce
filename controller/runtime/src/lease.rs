use crate::k8s::{self, api::apps::v1::Deployment, ObjectMeta, Patch, PatchParams, Resource};
use anyhow::{Context, Result};
use k8s::api::coordination::v1 as coordv1;
use std::sync::Arc;
use tokio::{sync::watch, time};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "vsync-controller-write";
const FIELD_MANAGER: &str = "vsync-controller";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

/// Ensures the status write Lease exists and starts competing for it.
pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    // The controller Deployment owns the Lease so that it is removed with it.
    let api = k8s::Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api
        .get(deployment_name)
        .await
        .with_context(|| format!("failed to fetch Deployment {ns}/{deployment_name}"))?;
    let owner = deployment
        .controller_owner_ref(&())
        .context("Deployment has no name or uid")?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // A resource version of "0" only creates the Lease if it does not exist.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![owner]),
            labels: Some(
                [
                    (
                        "app.kubernetes.io/component".to_string(),
                        "vsync-controller".to_string(),
                    ),
                    ("vsync.io/controller-ns".to_string(), ns.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => tracing::debug!("Lease already exists, no need to create it"),
        Err(error) => return Err(error.into()),
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}
