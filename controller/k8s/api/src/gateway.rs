pub use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteRules, HTTPRouteRulesBackendRefs, HTTPRouteSpec,
};
use std::collections::BTreeSet;

/// Returns the names of the `Service` backends an HTTPRoute references in its own namespace, in
/// name order.
///
/// Backends in other namespaces are skipped; they are not tracked against the route.
pub fn backend_services(namespace: &str, spec: &HTTPRouteSpec) -> Vec<String> {
    spec.rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.backend_refs.iter().flatten())
        .filter(|backend| is_service(backend))
        .filter(|backend| {
            let local = backend.namespace.as_deref().is_none_or(|ns| ns == namespace);
            if !local {
                tracing::debug!(
                    %namespace,
                    backend.namespace = ?backend.namespace,
                    backend.name = %backend.name,
                    "Skipping cross-namespace backend"
                );
            }
            local
        })
        .map(|backend| backend.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn is_service(backend: &HTTPRouteRulesBackendRefs) -> bool {
    let core_group = backend.group.as_deref().is_none_or(str::is_empty);
    let service_kind = backend.kind.as_deref().is_none_or(|k| k == "Service");
    core_group && service_kind
}
