use crate::{
    cache::{StatusCache, VsMetadata},
    reconcile::{self, LoadBalancerEntry},
};
use ahash::AHashMap as HashMap;
use kubert::lease::Claim;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::{fmt, future::Future, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    time::{self, Duration},
};
use vsync_controller_core::ResourceId;
use vsync_controller_k8s_api::{self as k8s, ingress, ResourceExt, RuleStatus};

pub type Sender = mpsc::Sender<Update>;
pub type Receiver = mpsc::Receiver<Update>;

/// A status write requested by the index or by the load balancer sync.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    /// Advertise `vip` for each of an Ingress's hostnames.
    Ingress {
        id: ResourceId,
        vip: String,
        hostnames: Vec<String>,
    },

    /// Withdraw an Ingress's hostnames after its virtual service is removed.
    DeleteIngress {
        id: ResourceId,
        hostnames: Vec<String>,
    },

    /// Set a `LoadBalancer` Service's address. Exactly one hostname is expected.
    Service {
        id: ResourceId,
        vip: String,
        hostnames: Vec<String>,
    },

    HostRule {
        id: ResourceId,
        status: RuleStatus,
    },

    HttpRule {
        id: ResourceId,
        status: RuleStatus,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource was modified concurrently: {0}")]
    Conflict(k8s::Error),

    #[error("resource not found: {0}")]
    NotFound(k8s::Error),

    #[error("status write timed out after {0:?}")]
    Timeout(Duration),

    #[error("status write failed: {0}")]
    Api(k8s::Error),

    #[error("expected exactly one hostname, got {0}")]
    InvalidHostnames(usize),
}

pub struct Controller {
    claims: watch::Receiver<Arc<Claim>>,
    client: k8s::Client,
    name: String,
    updates: Receiver,
    patch_timeout: Duration,
    cache: Arc<StatusCache>,
    metrics: ControllerMetrics,
    retry_backoff: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    pub(crate) patch_succeeded: Counter,
    pub(crate) patch_failed: Counter,
    pub(crate) patch_timeout: Counter,
    pub(crate) patch_skipped: Counter,
    pub(crate) patch_dropped: Counter,
    pub(crate) patch_retried: Counter,
}

/// An update awaiting its write. `seq` identifies the queued update it came from.
struct Pending {
    update: Update,
    seq: u64,
    attempt: u32,
}

const MAX_RETRIES: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub fn channel(capacity: usize) -> (Sender, Receiver) {
    mpsc::channel(capacity)
}

// === impl Update ===

impl Update {
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::Ingress { id, .. }
            | Self::DeleteIngress { id, .. }
            | Self::Service { id, .. }
            | Self::HostRule { id, .. }
            | Self::HttpRule { id, .. } => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Ingress { .. } | Self::DeleteIngress { .. } => "Ingress",
            Self::Service { .. } => "Service",
            Self::HostRule { .. } => "HostRule",
            Self::HttpRule { .. } => "HttpRule",
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

// === impl Pending ===

impl Pending {
    fn key(&self) -> String {
        self.update.to_string()
    }

    /// Forgets the resource's latest sequence number if this was the latest update.
    fn settle(&self, latest: &mut HashMap<String, u64>) {
        let key = self.key();
        if latest.get(&key) == Some(&self.seq) {
            latest.remove(&key);
        }
    }
}

// === impl Error ===

impl Error {
    /// Conflicts, missing objects, and timeouts may succeed once the object is re-read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotFound(_) | Self::Timeout(_))
    }
}

impl From<k8s::Error> for Error {
    fn from(error: k8s::Error) -> Self {
        let code = match &error {
            k8s::Error::Api(rsp) => Some(rsp.code),
            _ => None,
        };
        match code {
            Some(409) => Self::Conflict(error),
            Some(404) => Self::NotFound(error),
            _ => Self::Api(error),
        }
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();

        prom.register(
            "patch_succeeded",
            "Count of successful status patches",
            metrics.patch_succeeded.clone(),
        );
        prom.register(
            "patch_failed",
            "Count of failed status patches",
            metrics.patch_failed.clone(),
        );
        prom.register(
            "patch_timeout",
            "Count of status patches that timed out",
            metrics.patch_timeout.clone(),
        );
        prom.register(
            "patch_skipped",
            "Count of status patches skipped because the status was already synced",
            metrics.patch_skipped.clone(),
        );
        prom.register(
            "patch_retried",
            "Count of failed status patches that were requeued",
            metrics.patch_retried.clone(),
        );
        prom.register(
            "patch_dropped",
            "Count of status patches dropped because this replica does not hold the write lease",
            metrics.patch_dropped.clone(),
        );

        metrics
    }
}

// === impl Controller ===

impl Controller {
    pub fn new(
        claims: watch::Receiver<Arc<Claim>>,
        client: k8s::Client,
        name: impl ToString,
        updates: Receiver,
        patch_timeout: Duration,
        cache: Arc<StatusCache>,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            claims,
            client,
            name: name.to_string(),
            updates,
            patch_timeout,
            cache,
            metrics,
            retry_backoff: RETRY_BACKOFF,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Drains the update queue until it closes.
    ///
    /// Retryable failures are requeued with exponential backoff. A retry is dropped once a newer
    /// update for the same resource has been received.
    pub async fn run(mut self) {
        let (retries_tx, mut retries) = mpsc::unbounded_channel::<Pending>();
        let mut latest = HashMap::<String, u64>::default();
        let mut next_seq = 0;

        loop {
            let pending = tokio::select! {
                biased;

                Some(pending) = retries.recv() => {
                    if latest.get(&pending.key()) != Some(&pending.seq) {
                        tracing::debug!(update = %pending.update, "Dropping superseded retry");
                        continue;
                    }
                    pending
                }

                update = self.updates.recv() => match update {
                    Some(update) => {
                        next_seq += 1;
                        latest.insert(update.to_string(), next_seq);
                        Pending { update, seq: next_seq, attempt: 0 }
                    }
                    None => break,
                },
            };

            let key = pending.key();
            if !self.claims.borrow().is_current_for(&self.name) {
                tracing::debug!(update = %key, "Not the write leader; dropping status update");
                self.metrics.patch_dropped.inc();
                pending.settle(&mut latest);
                continue;
            }

            match self.process(pending.update.clone()).await {
                Ok(true) => {
                    self.metrics.patch_succeeded.inc();
                }
                Ok(false) => {
                    self.metrics.patch_skipped.inc();
                }
                Err(error) => {
                    if let Error::Timeout(_) = error {
                        self.metrics.patch_timeout.inc();
                    } else {
                        self.metrics.patch_failed.inc();
                    }

                    if error.is_retryable() && pending.attempt < MAX_RETRIES {
                        let backoff = self.retry_backoff * 2u32.pow(pending.attempt);
                        tracing::warn!(
                            update = %key,
                            %error,
                            attempt = pending.attempt,
                            ?backoff,
                            "Status update failed; retrying"
                        );
                        self.metrics.patch_retried.inc();
                        let retries = retries_tx.clone();
                        let retry = Pending {
                            attempt: pending.attempt + 1,
                            ..pending
                        };
                        tokio::spawn(async move {
                            time::sleep(backoff).await;
                            let _ = retries.send(retry);
                        });
                        continue;
                    }

                    if error.is_retryable() {
                        tracing::error!(update = %key, %error, "Status update failed; giving up");
                    } else {
                        tracing::error!(update = %key, %error, "Status update rejected");
                    }
                }
            }
            pending.settle(&mut latest);
        }
    }

    /// Performs a single write, returning false if it was unnecessary.
    async fn process(&self, update: Update) -> Result<bool, Error> {
        match update {
            Update::Ingress { id, vip, hostnames } => {
                self.patch_ingress(id, VsMetadata { vip, hostnames }).await
            }
            Update::DeleteIngress { id, hostnames } => self.delete_ingress(id, hostnames).await,
            Update::Service { id, vip, hostnames } => {
                self.patch_service(id, vip, hostnames).await
            }
            Update::HostRule { id, status } => self.patch_rule::<k8s::HostRule>(id, status).await,
            Update::HttpRule { id, status } => self.patch_rule::<k8s::HttpRule>(id, status).await,
        }
    }

    async fn patch_ingress(&self, id: ResourceId, metadata: VsMetadata) -> Result<bool, Error> {
        if self.cache.is_synced(&id, &metadata) {
            tracing::debug!(%id, "Ingress status already synced");
            return Ok(false);
        }

        let api = k8s::Api::<k8s::Ingress>::namespaced(self.client.clone(), &id.namespace);
        let ing = self.bounded(api.get(&id.name)).await?;

        let current = ingress_entries(&ing);
        let spec_hosts = ing.spec.as_ref().map(ingress::hosts).unwrap_or_default();
        let desired = metadata
            .hostnames
            .iter()
            .map(|hostname| (metadata.vip.clone(), hostname.clone()))
            .collect::<Vec<_>>();
        let entries = reconcile::reconcile(&current, &desired, &spec_hosts);
        tracing::info!(%id, before = ?current, after = ?entries, "Updating Ingress status");

        let patch = load_balancer_patch(ing.resource_version(), &entries);
        self.bounded(api.patch_status(
            &id.name,
            &k8s::PatchParams::default(),
            &k8s::Patch::Merge(patch),
        ))
        .await?;

        self.cache.save(&id, metadata);
        Ok(true)
    }

    async fn delete_ingress(&self, id: ResourceId, hostnames: Vec<String>) -> Result<bool, Error> {
        let api = k8s::Api::<k8s::Ingress>::namespaced(self.client.clone(), &id.namespace);
        let ing = match self.bounded(api.get(&id.name)).await {
            Ok(ing) => ing,
            Err(Error::NotFound(_)) => {
                tracing::debug!(%id, "Ingress already deleted");
                self.cache.delete(&id);
                return Ok(false);
            }
            Err(error) => return Err(error),
        };

        let current = ingress_entries(&ing);
        let entries = reconcile::remove_hosts(&current, &hostnames);
        tracing::info!(%id, before = ?current, after = ?entries, "Removing Ingress status");

        let patch = load_balancer_patch(ing.resource_version(), &entries);
        self.bounded(api.patch_status(
            &id.name,
            &k8s::PatchParams::default(),
            &k8s::Patch::Merge(patch),
        ))
        .await?;

        self.cache.delete(&id);
        Ok(true)
    }

    async fn patch_service(
        &self,
        id: ResourceId,
        vip: String,
        hostnames: Vec<String>,
    ) -> Result<bool, Error> {
        let entry = reconcile::service_status(&vip, &hostnames)?;
        tracing::info!(%id, ?entry, "Updating Service status");

        let api = k8s::Api::<k8s::Service>::namespaced(self.client.clone(), &id.namespace);
        let patch = load_balancer_patch(None, &[entry]);
        self.bounded(api.patch_status(
            &id.name,
            &k8s::PatchParams::default(),
            &k8s::Patch::Merge(patch),
        ))
        .await?;
        Ok(true)
    }

    async fn patch_rule<K>(&self, id: ResourceId, status: RuleStatus) -> Result<bool, Error>
    where
        K: k8s::Resource<Scope = k8s::NamespaceResourceScope, DynamicType = ()>,
        K: Clone + DeserializeOwned + fmt::Debug,
    {
        tracing::info!(%id, kind = %K::kind(&()), ?status, "Updating rule status");
        let api = k8s::Api::<K>::namespaced(self.client.clone(), &id.namespace);
        let patch = json!({ "status": status });
        self.bounded(api.patch_status(
            &id.name,
            &k8s::PatchParams::default(),
            &k8s::Patch::Merge(patch),
        ))
        .await?;
        Ok(true)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, k8s::Error>>,
    ) -> Result<T, Error> {
        match time::timeout(self.patch_timeout, call).await {
            Ok(res) => res.map_err(Into::into),
            Err(_) => Err(Error::Timeout(self.patch_timeout)),
        }
    }
}

fn ingress_entries(ing: &k8s::Ingress) -> Vec<k8s::IngressLoadBalancerIngress> {
    ing.status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default()
}

/// Builds a merge patch that replaces `status.loadBalancer.ingress`.
///
/// When a resource version is given the write fails with a conflict if the object has changed
/// since it was read.
fn load_balancer_patch<E>(resource_version: Option<String>, entries: &[E]) -> serde_json::Value
where
    E: LoadBalancerEntry + Serialize,
{
    let mut patch = json!({
        "status": {
            "loadBalancer": {
                "ingress": entries,
            },
        },
    });
    if let Some(resource_version) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": resource_version });
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s::ErrorResponse;

    fn api_error(code: u16) -> k8s::Error {
        k8s::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn classifies_api_errors() {
        assert!(matches!(Error::from(api_error(409)), Error::Conflict(_)));
        assert!(matches!(Error::from(api_error(404)), Error::NotFound(_)));
        assert!(matches!(Error::from(api_error(422)), Error::Api(_)));
    }

    #[test]
    fn retryable_errors() {
        assert!(Error::from(api_error(409)).is_retryable());
        assert!(Error::from(api_error(404)).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::from(api_error(500)).is_retryable());
        assert!(!Error::InvalidHostnames(2).is_retryable());
    }

    #[test]
    fn patch_carries_resource_version() {
        let entries = vec![k8s::IngressLoadBalancerIngress::new("10.0.0.1", "a.com")];
        assert_eq!(
            load_balancer_patch(Some("42".to_string()), &entries),
            json!({
                "metadata": { "resourceVersion": "42" },
                "status": { "loadBalancer": { "ingress": [{ "ip": "10.0.0.1", "hostname": "a.com" }] } },
            })
        );
        assert_eq!(
            load_balancer_patch::<k8s::LoadBalancerIngress>(None, &[]),
            json!({ "status": { "loadBalancer": { "ingress": [] } } })
        );
    }
}
