use crate::{
    core::{HostPathStore, RelationshipStore},
    index::{self, Index, IndexMetrics},
    k8s::{self, gateway, ingress::IngressClassFilter, Client, Resource},
    lease, status,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

const RECONCILIATION_PERIOD: Duration = Duration::from_secs(10);

// The maximum number of status patches to buffer. Sending a patch takes at least 1ms, so the
// buffer holds roughly one reconciliation period's worth of writes. Updates that do not fit are
// held by the index and re-sent every reconciliation period.
const STATUS_UPDATE_QUEUE_SIZE: usize = RECONCILIATION_PERIOD.as_millis() as usize;

#[derive(Debug, Parser)]
#[clap(name = "vsync", about = "Syncs routing resources to an external load balancer")]
pub struct Args {
    #[clap(long, default_value = "vsync=info,warn", env = "VSYNC_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The ingress class this controller serves.
    #[clap(long, default_value = "vsync")]
    ingress_class: String,

    /// Also serve Ingresses that name no class.
    #[clap(long)]
    default_ingress_controller: bool,

    #[clap(long, default_value = "vsync-controller")]
    controller_deployment_name: String,

    #[clap(long, default_value = "vsync-system")]
    controller_namespace: String,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            ingress_class,
            default_ingress_controller,
            controller_deployment_name,
            controller_namespace,
            patch_timeout_ms,
        } = self;

        let relations = RelationshipStore::shared();
        let hosts = HostPathStore::shared();
        let status_cache = status::StatusCache::shared();

        let mut prom = <Registry>::default();
        let index_metrics = IndexMetrics::register(prom.sub_registry_with_prefix("index"));
        let status_metrics =
            status::ControllerMetrics::register(prom.sub_registry_with_prefix("resource_status"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname = std::env::var("HOSTNAME")
            .context("Failed to fetch `HOSTNAME` environment variable")?;

        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        let (resyncs_tx, resyncs_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = status::channel(STATUS_UPDATE_QUEUE_SIZE);
        let index = Index::shared(
            relations,
            hosts,
            IngressClassFilter::new(ingress_class, default_ingress_controller),
            resyncs_tx,
            updates_tx,
            index_metrics,
        );

        // Spawn resource watches.

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses)
                .instrument(info_span!("ingresses")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        let endpoints = runtime.watch_all::<k8s::Endpoints>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), endpoints)
                .instrument(info_span!("endpoints")),
        );

        let secrets = runtime.watch_all::<k8s::Secret>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), secrets).instrument(info_span!("secrets")),
        );

        if api_resource_exists::<k8s::HostRule>(&runtime.client()).await {
            let host_rules = runtime.watch_all::<k8s::HostRule>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), host_rules)
                    .instrument(info_span!("hostrules.vsync.io")),
            );
        } else {
            tracing::warn!("hostrules.vsync.io resource kind not found, skipping watches");
        }

        if api_resource_exists::<k8s::HttpRule>(&runtime.client()).await {
            let http_rules = runtime.watch_all::<k8s::HttpRule>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), http_rules)
                    .instrument(info_span!("httprules.vsync.io")),
            );
        } else {
            tracing::warn!("httprules.vsync.io resource kind not found, skipping watches");
        }

        // Re-send status updates that were deferred while the status queue was full.
        tokio::spawn(
            Index::run(index.clone(), RECONCILIATION_PERIOD)
                .instrument(info_span!("status_flush")),
        );

        if api_resource_exists::<gateway::HTTPRoute>(&runtime.client()).await {
            let http_routes = runtime.watch_all::<gateway::HTTPRoute>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index, http_routes)
                    .instrument(info_span!("httproutes.gateway.networking.k8s.io")),
            );
        } else {
            tracing::warn!(
                "httproutes.gateway.networking.k8s.io resource kind not found, skipping watches"
            );
        }

        // Drain the rebuild queue, logging each route to recompute.
        tokio::spawn(drain_resyncs(resyncs_rx).instrument(info_span!("resyncs")));

        let status_controller = status::Controller::new(
            claims,
            runtime.client(),
            hostname,
            updates_rx,
            Duration::from_millis(patch_timeout_ms),
            status_cache,
            status_metrics,
        );
        tokio::spawn(
            status_controller
                .run()
                .instrument(info_span!("status_controller")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn drain_resyncs(mut resyncs: mpsc::UnboundedReceiver<index::Resync>) {
    while let Some(index::Resync { kind, route, key }) = resyncs.recv().await {
        info!(%kind, %route, %key, "Route needs rebuild");
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
