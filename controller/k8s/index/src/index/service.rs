use super::Index;
use vsync_controller_core::RouteKind;

impl Index {
    /// Resolves a Service to the routes referencing it.
    ///
    /// A deleted Service's entry is only dropped once no route references it; references are
    /// otherwise removed as the routes themselves are deleted.
    pub(super) fn service_change(
        &self,
        route_kind: RouteKind,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let mappings = self.relations.routes(route_kind);
        if let Err(error) = self.services.get(namespace, name) {
            if mappings.service_routes(namespace, name).is_empty() {
                tracing::debug!(key, %error, "Removing unreferenced Service");
                mappings.delete_service(namespace, name);
            }
        }

        let routes = mappings.service_routes(namespace, name);
        tracing::debug!(key, %route_kind, ?routes, "Routes referencing Service");
        if routes.is_empty() {
            return None;
        }
        Some(routes)
    }

    /// Endpoints share their Service's name.
    pub(super) fn endpoints_change(
        &self,
        route_kind: RouteKind,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        self.service_change(route_kind, name, namespace, key)
    }
}
