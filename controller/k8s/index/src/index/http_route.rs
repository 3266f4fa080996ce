use super::Index;
use vsync_controller_core::RouteKind;
use vsync_controller_k8s_api::gateway;

impl Index {
    /// Mirrors the Ingress resolver for Gateway API routes, which reference no secrets.
    pub(super) fn http_route_change(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let routes = self.relations.routes(RouteKind::HttpRoute);
        match self.http_routes.get(namespace, name) {
            Err(error) => {
                tracing::debug!(key, %error, "Removing HTTPRoute relationships");
                routes.remove_route(namespace, name);
            }
            Ok(route) => {
                for svc in gateway::backend_services(namespace, &route.spec) {
                    tracing::debug!(key, service = %svc, "Updating HTTPRoute relationship");
                    routes.update_service_route(namespace, &svc, name);
                }
            }
        }
        Some(vec![name.to_string()])
    }
}
