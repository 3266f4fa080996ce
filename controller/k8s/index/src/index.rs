use crate::{cache::ObjectCache, metrics::IndexMetrics};
use ahash::AHashMap as HashMap;
use parking_lot::{Mutex, RwLock};
use std::{fmt, sync::Arc};
use tokio::{
    sync::mpsc::{error::TrySendError, UnboundedSender},
    time::{self, Duration},
};
use vsync_controller_core::{HostPathStore, RelationshipStore, ResourceId, RouteKind};
use vsync_controller_k8s_api::{
    self as k8s, gateway, ingress::IngressClassFilter, ResourceExt, RuleStatus,
};
use vsync_controller_k8s_status as status;

mod host_rule;
mod http_route;
mod http_rule;
mod ingress;
mod service;

pub type SharedIndex = Arc<RwLock<Index>>;

/// The kinds of objects whose changes are resolved to routes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Ingress,
    HttpRoute,
    Service,
    Endpoints,
    Secret,
    HostRule,
    HttpRule,
}

/// A route that must be rebuilt, and the change that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resync {
    pub kind: RouteKind,
    pub route: ResourceId,
    pub key: String,
}

/// Caches the watched objects and resolves each change to the routes it affects.
///
/// Relationship state lives in the shared stores so that it may be read outside of the index
/// lock.
pub struct Index {
    ingresses: ObjectCache<k8s::Ingress>,
    http_routes: ObjectCache<gateway::HTTPRoute>,
    services: ObjectCache<k8s::Service>,
    host_rules: ObjectCache<k8s::HostRule>,
    http_rules: ObjectCache<k8s::HttpRule>,

    relations: Arc<RelationshipStore>,
    hosts: Arc<HostPathStore>,
    class_filter: IngressClassFilter,

    resyncs: UnboundedSender<Resync>,
    statuses: status::Sender,
    /// Status updates that did not fit in the status queue, by resource.
    deferred_statuses: Mutex<HashMap<String, status::Update>>,
    metrics: IndexMetrics,
}

// === impl Kind ===

impl Kind {
    /// The route graphs this kind participates in.
    fn route_kinds(self) -> &'static [RouteKind] {
        match self {
            Self::Ingress | Self::Secret | Self::HostRule | Self::HttpRule => &[RouteKind::Ingress],
            Self::HttpRoute => &[RouteKind::HttpRoute],
            Self::Service | Self::Endpoints => &[RouteKind::Ingress, RouteKind::HttpRoute],
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "Ingress".fmt(f),
            Self::HttpRoute => "HTTPRoute".fmt(f),
            Self::Service => "Service".fmt(f),
            Self::Endpoints => "Endpoints".fmt(f),
            Self::Secret => "Secret".fmt(f),
            Self::HostRule => "HostRule".fmt(f),
            Self::HttpRule => "HttpRule".fmt(f),
        }
    }
}

// === impl Index ===

impl Index {
    pub fn shared(
        relations: Arc<RelationshipStore>,
        hosts: Arc<HostPathStore>,
        class_filter: IngressClassFilter,
        resyncs: UnboundedSender<Resync>,
        statuses: status::Sender,
        metrics: IndexMetrics,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            ingresses: ObjectCache::new("Ingress"),
            http_routes: ObjectCache::new("HTTPRoute"),
            services: ObjectCache::new("Service"),
            host_rules: ObjectCache::new("HostRule"),
            http_rules: ObjectCache::new("HttpRule"),
            relations,
            hosts,
            class_filter,
            resyncs,
            statuses,
            deferred_statuses: Mutex::default(),
            metrics,
        }))
    }

    /// Periodically re-sends status updates that were deferred because the status queue was
    /// full.
    pub async fn run(index: SharedIndex, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            index.read().flush_statuses();
        }
    }

    /// Re-sends deferred status updates. Those that still do not fit remain deferred.
    pub fn flush_statuses(&self) {
        let deferred = std::mem::take(&mut *self.deferred_statuses.lock());
        if deferred.is_empty() {
            return;
        }
        tracing::debug!(updates = deferred.len(), "Re-sending deferred status updates");
        for update in deferred.into_values() {
            self.send_status(update);
        }
    }

    /// Returns the names of the `route_kind` routes affected by a change to an object.
    ///
    /// `None` means nothing needs to be rebuilt. Names are either bare route names in
    /// `namespace` or `namespace/name` keys.
    pub fn resolve(
        &self,
        route_kind: RouteKind,
        kind: Kind,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let routes = match (route_kind, kind) {
            (RouteKind::Ingress, Kind::Ingress) => self.ingress_change(name, namespace, key),
            (RouteKind::HttpRoute, Kind::HttpRoute) => {
                self.http_route_change(name, namespace, key)
            }
            (route_kind, Kind::Service) => self.service_change(route_kind, name, namespace, key),
            (route_kind, Kind::Endpoints) => {
                self.endpoints_change(route_kind, name, namespace, key)
            }
            (RouteKind::Ingress, Kind::Secret) => self.secret_change(name, namespace, key),
            (RouteKind::Ingress, Kind::HostRule) => self.host_rule_change(name, namespace, key),
            (RouteKind::Ingress, Kind::HttpRule) => self.http_rule_change(name, namespace, key),
            (route_kind, kind) => {
                tracing::debug!(%route_kind, %kind, key, "Kind does not affect route kind");
                None
            }
        };
        self.metrics.resolved(
            route_kind,
            kind,
            routes.as_ref().is_some_and(|r| !r.is_empty()),
        );
        routes
    }

    /// Resolves a change for every route graph the kind participates in and enqueues the
    /// affected routes for rebuild.
    fn process(&self, kind: Kind, namespace: &str, name: &str) {
        let key = format!("{kind}/{namespace}/{name}");
        for &route_kind in kind.route_kinds() {
            if let Some(routes) = self.resolve(route_kind, kind, name, namespace, &key) {
                self.enqueue(route_kind, namespace, &key, routes);
            }
        }
    }

    fn enqueue(&self, kind: RouteKind, namespace: &str, key: &str, routes: Vec<String>) {
        for route in routes {
            let resync = Resync {
                kind,
                route: ResourceId::qualify(&route, namespace),
                key: key.to_string(),
            };
            tracing::trace!(?resync, "Enqueueing route");
            if self.resyncs.send(resync).is_err() {
                tracing::warn!(key, "Rebuild queue closed");
                return;
            }
            self.metrics.resynced(kind);
        }
    }

    /// Enqueues a status update, superseding any deferred update for the same resource.
    fn send_status(&self, update: status::Update) {
        let key = update.to_string();
        match self.statuses.try_send(update) {
            Ok(()) => {
                self.deferred_statuses.lock().remove(&key);
            }
            Err(TrySendError::Full(update)) => {
                tracing::warn!(%update, "Status queue is full; deferring update");
                self.metrics.status_deferred();
                self.deferred_statuses.lock().insert(key, update);
            }
            Err(TrySendError::Closed(update)) => {
                tracing::warn!(%update, "Status queue closed; dropping update");
            }
        }
    }

    /// Emits a rule status update unless the rule already reports it.
    fn update_rule_status(
        &self,
        kind: Kind,
        id: &ResourceId,
        current: Option<&RuleStatus>,
        status: RuleStatus,
    ) {
        if current == Some(&status) {
            return;
        }
        tracing::debug!(%kind, %id, ?status, "Updating rule status");
        let id = id.clone();
        let update = match kind {
            Kind::HostRule => status::Update::HostRule { id, status },
            Kind::HttpRule => status::Update::HttpRule { id, status },
            _ => return,
        };
        self.send_status(update);
    }
}

fn hostrule_not_found(hostrule: &str) -> RuleStatus {
    RuleStatus::rejected(format!("hostrule {hostrule} not found or is invalid"))
}

// === impl IndexNamespacedResource ===

impl kubert::index::IndexNamespacedResource<k8s::Ingress> for Index {
    fn apply(&mut self, ing: k8s::Ingress) {
        let namespace = ing.namespace().expect("Ingress must have a namespace");
        let name = ing.name_unchecked();

        if !self.class_filter.accepts(&ing) {
            tracing::info!(
                %namespace,
                %name,
                class = ?k8s::ingress::ingress_class(&ing),
                "Ignoring Ingress for another class"
            );
            if self.ingresses.remove(&namespace, &name).is_some() {
                self.remove_ingress(&namespace, &name);
            }
            return;
        }

        self.metrics.applied(Kind::Ingress);
        self.ingresses.insert(namespace.clone(), name.clone(), ing);
        self.process(Kind::Ingress, &namespace, &name);
        self.index_host_paths(&namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::Ingress);
        if self.ingresses.remove(&namespace, &name).is_some() {
            self.remove_ingress(&namespace, &name);
        }
    }
}

impl kubert::index::IndexNamespacedResource<gateway::HTTPRoute> for Index {
    fn apply(&mut self, route: gateway::HTTPRoute) {
        let namespace = route.namespace().expect("HTTPRoute must have a namespace");
        let name = route.name_unchecked();
        self.metrics.applied(Kind::HttpRoute);
        self.http_routes.insert(namespace.clone(), name.clone(), route);
        self.process(Kind::HttpRoute, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::HttpRoute);
        self.http_routes.remove(&namespace, &name);
        self.process(Kind::HttpRoute, &namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Service> for Index {
    fn apply(&mut self, svc: k8s::Service) {
        let namespace = svc.namespace().expect("Service must have a namespace");
        let name = svc.name_unchecked();
        self.metrics.applied(Kind::Service);
        self.services.insert(namespace.clone(), name.clone(), svc);
        self.process(Kind::Service, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::Service);
        self.services.remove(&namespace, &name);
        self.process(Kind::Service, &namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Endpoints> for Index {
    fn apply(&mut self, ep: k8s::Endpoints) {
        let namespace = ep.namespace().expect("Endpoints must have a namespace");
        let name = ep.name_unchecked();
        self.metrics.applied(Kind::Endpoints);
        self.process(Kind::Endpoints, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::Endpoints);
        self.process(Kind::Endpoints, &namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Secret> for Index {
    fn apply(&mut self, secret: k8s::Secret) {
        let namespace = secret.namespace().expect("Secret must have a namespace");
        let name = secret.name_unchecked();
        self.metrics.applied(Kind::Secret);
        self.process(Kind::Secret, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::Secret);
        self.process(Kind::Secret, &namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::HostRule> for Index {
    fn apply(&mut self, rule: k8s::HostRule) {
        let namespace = rule.namespace().expect("HostRule must have a namespace");
        let name = rule.name_unchecked();
        self.metrics.applied(Kind::HostRule);
        self.host_rules.insert(namespace.clone(), name.clone(), rule);
        self.process(Kind::HostRule, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::HostRule);
        self.host_rules.remove(&namespace, &name);
        self.process(Kind::HostRule, &namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::HttpRule> for Index {
    fn apply(&mut self, rule: k8s::HttpRule) {
        let namespace = rule.namespace().expect("HttpRule must have a namespace");
        let name = rule.name_unchecked();
        self.metrics.applied(Kind::HttpRule);
        self.http_rules.insert(namespace.clone(), name.clone(), rule);
        self.process(Kind::HttpRule, &namespace, &name);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.deleted(Kind::HttpRule);
        self.http_rules.remove(&namespace, &name);
        self.process(Kind::HttpRule, &namespace, &name);
    }
}
