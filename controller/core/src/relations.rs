use crate::{store::ObjectMapStore, ResourceId};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// The routing-intent kinds whose relationships are tracked.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum RouteKind {
    Ingress,
    HttpRoute,
}

/// Holds every cross-resource mapping known to the controller.
///
/// A single instance is created at startup and shared by all watch tasks.
#[derive(Debug, Default)]
pub struct RelationshipStore {
    ingresses: RouteMappings,
    http_routes: RouteMappings,
    crds: CrdMappings,
}

/// Maps services and secrets to the routes that reference them.
///
/// Routes are stored by name within the referencing object's namespace. The inverse mapping is not
/// stored; it is recomputed from the route's spec whenever the route changes.
#[derive(Debug, Default)]
pub struct RouteMappings {
    services: ObjectMapStore<BTreeSet<String>>,
    secrets: ObjectMapStore<BTreeSet<String>>,
}

/// Mappings between host rules, their FQDNs, and the HTTP rules that govern their paths.
///
/// All rule keys are `namespace/name`.
#[derive(Debug, Default)]
pub struct CrdMappings {
    hostrule_fqdn: ObjectMapStore<String>,
    fqdn_hostrule: ObjectMapStore<String>,
    hostrule_paths: ObjectMapStore<BTreeMap<String, String>>,
    httprule_hostrule: ObjectMapStore<String>,
}

// === impl RouteKind ===

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "Ingress".fmt(f),
            Self::HttpRoute => "HTTPRoute".fmt(f),
        }
    }
}

// === impl RelationshipStore ===

impl RelationshipStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn routes(&self, kind: RouteKind) -> &RouteMappings {
        match kind {
            RouteKind::Ingress => &self.ingresses,
            RouteKind::HttpRoute => &self.http_routes,
        }
    }

    pub fn crds(&self) -> &CrdMappings {
        &self.crds
    }
}

// === impl RouteMappings ===

impl RouteMappings {
    pub fn update_service_route(&self, namespace: &str, service: &str, route: &str) {
        insert_member(&self.services, &ResourceId::new(namespace, service), route);
    }

    pub fn update_secret_route(&self, namespace: &str, secret: &str, route: &str) {
        insert_member(&self.secrets, &ResourceId::new(namespace, secret), route);
    }

    /// Returns the routes referencing a service, in name order.
    pub fn service_routes(&self, namespace: &str, service: &str) -> Vec<String> {
        members(&self.services, &ResourceId::new(namespace, service))
    }

    pub fn secret_routes(&self, namespace: &str, secret: &str) -> Vec<String> {
        members(&self.secrets, &ResourceId::new(namespace, secret))
    }

    pub fn has_service(&self, namespace: &str, service: &str) -> bool {
        self.services
            .contains(&ResourceId::new(namespace, service).key())
    }

    pub fn delete_service(&self, namespace: &str, service: &str) {
        self.services
            .delete(&ResourceId::new(namespace, service).key());
    }

    /// Removes a route from every service and secret set in its namespace.
    ///
    /// Sets that become empty are dropped.
    pub fn remove_route(&self, namespace: &str, route: &str) {
        let sweep = |key: &str, routes: &mut BTreeSet<String>| {
            if in_namespace(key, namespace) {
                routes.remove(route);
            }
            !routes.is_empty()
        };
        self.services.retain(sweep);
        self.secrets.retain(sweep);
    }
}

fn insert_member(store: &ObjectMapStore<BTreeSet<String>>, id: &ResourceId, member: &str) {
    store.modify(&id.key(), |entry| {
        entry
            .get_or_insert_with(BTreeSet::new)
            .insert(member.to_string());
    });
}

fn members(store: &ObjectMapStore<BTreeSet<String>>, id: &ResourceId) -> Vec<String> {
    store
        .get(&id.key())
        .map(|routes| routes.into_iter().collect())
        .unwrap_or_default()
}

fn in_namespace(key: &str, namespace: &str) -> bool {
    ResourceId::parse(key).is_some_and(|id| id.namespace == namespace)
}

// === impl CrdMappings ===

impl CrdMappings {
    pub fn hostrule_fqdn(&self, hostrule: &str) -> Option<String> {
        self.hostrule_fqdn.get(hostrule)
    }

    pub fn fqdn_hostrule(&self, fqdn: &str) -> Option<String> {
        self.fqdn_hostrule.get(fqdn)
    }

    /// Records that `hostrule` owns `fqdn`, in both directions.
    ///
    /// Callers must delete a previous FQDN with [`Self::delete_hostrule_fqdn`] first.
    /// Between the two calls a reader may observe the host rule with no FQDN at all.
    pub fn update_fqdn_hostrule(&self, fqdn: &str, hostrule: &str) {
        self.hostrule_fqdn.add_or_update(hostrule, fqdn.to_string());
        self.fqdn_hostrule.add_or_update(fqdn, hostrule.to_string());
    }

    /// Drops a host rule's FQDN mapping, returning the FQDN it held.
    ///
    /// The reverse entry is only dropped while it still points at this host rule.
    pub fn delete_hostrule_fqdn(&self, hostrule: &str) -> Option<String> {
        let fqdn = self.hostrule_fqdn.delete(hostrule)?;
        self.fqdn_hostrule.modify(&fqdn, |owner| {
            if owner.as_deref() == Some(hostrule) {
                *owner = None;
            }
        });
        Some(fqdn)
    }

    /// Returns the `path -> httprule` mapping registered under a host rule.
    pub fn host_http_rules(&self, hostrule: &str) -> Option<BTreeMap<String, String>> {
        self.hostrule_paths.get(hostrule)
    }

    /// Returns the host rule an HTTP rule targets and the paths it currently governs.
    pub fn http_rule_paths(&self, httprule: &str) -> Option<(String, BTreeSet<String>)> {
        let hostrule = self.httprule_hostrule.get(httprule)?;
        let paths = self
            .hostrule_paths
            .get(&hostrule)
            .into_iter()
            .flatten()
            .filter(|(_, owner)| owner.as_str() == httprule)
            .map(|(path, _)| path)
            .collect();
        Some((hostrule, paths))
    }

    pub fn update_host_http_rule(&self, hostrule: &str, path: &str, httprule: &str) {
        self.hostrule_paths.modify(hostrule, |paths| {
            paths
                .get_or_insert_with(BTreeMap::new)
                .insert(path.to_string(), httprule.to_string());
        });
        self.httprule_hostrule
            .add_or_update(httprule, hostrule.to_string());
    }

    /// Removes every path an HTTP rule governs, returning its former host rule and paths.
    pub fn remove_http_rule(&self, httprule: &str) -> Option<(String, BTreeSet<String>)> {
        let hostrule = self.httprule_hostrule.delete(httprule)?;
        let paths = self.hostrule_paths.modify(&hostrule, |entry| {
            let mut removed = BTreeSet::new();
            if let Some(paths) = entry {
                paths.retain(|path, owner| {
                    if owner.as_str() == httprule {
                        removed.insert(path.clone());
                        return false;
                    }
                    true
                });
                if paths.is_empty() {
                    *entry = None;
                }
            }
            removed
        });
        Some((hostrule, paths))
    }

    /// Replaces the set of paths an HTTP rule governs.
    ///
    /// The previous set is removed first; it is not merged with the new one.
    pub fn replace_http_rule_paths<'p>(
        &self,
        httprule: &str,
        hostrule: &str,
        paths: impl IntoIterator<Item = &'p str>,
    ) {
        self.remove_http_rule(httprule);
        for path in paths {
            self.update_host_http_rule(hostrule, path, httprule);
        }
    }
}
