use super::{Index, Kind};
use vsync_controller_core::{ResourceId, RouteKind};
use vsync_controller_k8s_api::{ingress as spec, IngressSpec};

impl Index {
    /// An Ingress always resolves to itself. Its service and secret references are recorded
    /// additively; references it no longer makes are dropped only when it is deleted.
    pub(super) fn ingress_change(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let routes = self.relations.routes(RouteKind::Ingress);
        match self.ingresses.get(namespace, name) {
            Err(error) => {
                tracing::debug!(key, %error, "Removing Ingress relationships");
                routes.remove_route(namespace, name);
            }
            Ok(ing) => {
                if let Some(ing_spec) = ing.spec.as_ref() {
                    let id = ResourceId::new(namespace, name);
                    self.warn_duplicate_host_paths(&id, ing_spec, key);

                    for svc in spec::backend_services(ing_spec) {
                        tracing::debug!(key, service = %svc, "Updating Ingress relationship");
                        routes.update_service_route(namespace, &svc, name);
                    }
                    for secret in spec::tls_secrets(ing_spec) {
                        tracing::debug!(key, %secret, "Updating Ingress relationship");
                        routes.update_secret_route(namespace, &secret, name);
                    }
                }
            }
        }
        Some(vec![name.to_string()])
    }

    pub(super) fn secret_change(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let routes = self
            .relations
            .routes(RouteKind::Ingress)
            .secret_routes(namespace, name);
        tracing::debug!(key, ?routes, "Ingresses referencing secret");
        if routes.is_empty() {
            return None;
        }
        Some(routes)
    }

    /// Replaces an Ingress's advertised host/path pairs with those in its current spec.
    pub(super) fn index_host_paths(&self, namespace: &str, name: &str) {
        let route = ResourceId::new(namespace, name).key();
        self.hosts.remove_route(&route);

        let Ok(ing) = self.ingresses.get(namespace, name) else {
            return;
        };
        for (host, path) in ing.spec.iter().flat_map(spec::host_paths) {
            self.hosts.add_host_path(&host, &path, &route);
        }
    }

    /// Resolves an Ingress that was deleted or is no longer ours and stops advertising its
    /// hosts.
    pub(super) fn remove_ingress(&self, namespace: &str, name: &str) {
        self.process(Kind::Ingress, namespace, name);
        self.hosts.remove_route(&ResourceId::new(namespace, name).key());
    }

    fn warn_duplicate_host_paths(&self, id: &ResourceId, ing_spec: &IngressSpec, key: &str) {
        let route = id.key();
        for (host, path) in spec::host_paths(ing_spec) {
            let Some(paths) = self.hosts.get_host_path_store(&host) else {
                continue;
            };
            let owners = paths.get(&path).into_iter().flatten();
            for owner in owners.filter(|owner| **owner != route) {
                tracing::warn!(
                    key,
                    %host,
                    %path,
                    %owner,
                    "Host and path are already advertised by another route"
                );
            }
        }
    }
}
