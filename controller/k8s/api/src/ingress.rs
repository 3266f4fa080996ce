use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, IngressSpec};
use kube::ResourceExt;
use std::collections::BTreeSet;

/// The annotation older Ingresses use in place of `spec.ingressClassName`.
pub const CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const DEFAULT_PATH: &str = "/";

/// Decides which Ingresses this controller is responsible for.
#[derive(Clone, Debug)]
pub struct IngressClassFilter {
    class: String,
    default_controller: bool,
}

// === impl IngressClassFilter ===

impl IngressClassFilter {
    pub fn new(class: impl Into<String>, default_controller: bool) -> Self {
        Self {
            class: class.into(),
            default_controller,
        }
    }

    /// As the default controller, every Ingress is accepted unless it names another class.
    /// Otherwise only Ingresses naming this controller's class are accepted.
    pub fn accepts(&self, ingress: &Ingress) -> bool {
        match ingress_class(ingress) {
            Some(class) => class == self.class,
            None => self.default_controller,
        }
    }
}

/// Returns the class an Ingress names, preferring `spec.ingressClassName` over the annotation.
pub fn ingress_class(ingress: &Ingress) -> Option<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        .or_else(|| {
            ingress
                .annotations()
                .get(CLASS_ANNOTATION)
                .map(String::as_str)
        })
}

/// Returns the names of the services an Ingress routes to, in name order.
pub fn backend_services(spec: &IngressSpec) -> Vec<String> {
    let rule_backends = spec
        .rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.http.iter())
        .flat_map(|http| http.paths.iter())
        .map(|path| &path.backend);

    spec.default_backend
        .iter()
        .chain(rule_backends)
        .filter_map(service_name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn service_name(backend: &IngressBackend) -> Option<String> {
    backend.service.as_ref().map(|svc| svc.name.clone())
}

/// Returns the names of the secrets an Ingress terminates TLS with, in name order.
pub fn tls_secrets(spec: &IngressSpec) -> Vec<String> {
    spec.tls
        .iter()
        .flatten()
        .filter_map(|tls| tls.secret_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the host of every rule. A rule without a host contributes an empty string.
pub fn hosts(spec: &IngressSpec) -> Vec<String> {
    spec.rules
        .iter()
        .flatten()
        .map(|rule| rule.host.clone().unwrap_or_default())
        .collect()
}

/// Returns every `(host, path)` pair an Ingress advertises.
///
/// Rules without a host are not advertised under any hostname. Paths default to `/`.
pub fn host_paths(spec: &IngressSpec) -> BTreeSet<(String, String)> {
    let mut pairs = BTreeSet::new();
    for rule in spec.rules.iter().flatten() {
        let Some(host) = rule.host.as_deref().filter(|h| !h.is_empty()) else {
            continue;
        };
        for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
            let path = path.path.as_deref().unwrap_or(DEFAULT_PATH);
            pairs.insert((host.to_string(), path.to_string()));
        }
    }
    pairs
}
