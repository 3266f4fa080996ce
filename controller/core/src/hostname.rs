use crate::store::ObjectMapStore;
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// The routes advertised under each path of a single hostname.
pub type PathRoutes = BTreeMap<String, BTreeSet<String>>;

/// Indexes the `(path, route)` pairs advertised for each fully-qualified hostname.
///
/// Route names are stored exactly as they are added; the controller adds them as
/// `namespace/name` since a hostname may be shared across namespaces.
#[derive(Debug, Default)]
pub struct HostPathStore {
    hosts: ObjectMapStore<PathRoutes>,
}

// === impl HostPathStore ===

impl HostPathStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get_host_path_store(&self, hostname: &str) -> Option<PathRoutes> {
        self.hosts.get(hostname)
    }

    pub fn add_host_path(&self, hostname: &str, path: &str, route: &str) {
        self.hosts.modify(hostname, |paths| {
            paths
                .get_or_insert_with(PathRoutes::new)
                .entry(path.to_string())
                .or_default()
                .insert(route.to_string());
        });
    }

    /// Removes a route from every hostname and path it is advertised under.
    pub fn remove_route(&self, route: &str) {
        self.hosts.retain(|_, paths| {
            paths.retain(|_, routes| {
                routes.remove(route);
                !routes.is_empty()
            });
            !paths.is_empty()
        });
    }

    /// Returns every route advertised for a hostname, across all of its paths.
    pub fn routes_for_host(&self, hostname: &str) -> Option<Vec<String>> {
        let paths = self.hosts.get(hostname)?;
        let routes = paths.into_values().flatten().collect::<BTreeSet<_>>();
        Some(routes.into_iter().collect())
    }

    /// Returns every route advertised for a hostname under a path that starts with any of
    /// `prefixes`.
    ///
    /// Prefixes are matched literally. Returns `None` when the hostname is not indexed.
    pub fn routes_matching_prefixes<'p>(
        &self,
        hostname: &str,
        prefixes: impl IntoIterator<Item = &'p str>,
    ) -> Option<Vec<String>> {
        let paths = self.hosts.get(hostname)?;
        let mut routes = BTreeSet::new();
        for prefix in prefixes {
            let matcher = match PrefixMatch::new(prefix) {
                Ok(m) => m,
                Err(error) => {
                    tracing::warn!(%hostname, %prefix, %error, "Invalid path prefix");
                    continue;
                }
            };
            for (path, path_routes) in paths.iter() {
                if !matcher.is_match(path) {
                    continue;
                }
                tracing::trace!(%hostname, %path, %prefix, "Path matches prefix");
                routes.extend(path_routes.iter().cloned());
            }
        }
        Some(routes.into_iter().collect())
    }
}

/// Matches paths beginning with a literal prefix.
#[derive(Clone, Debug)]
struct PrefixMatch(Regex);

impl PrefixMatch {
    fn new(prefix: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^{}", regex::escape(prefix))).map(Self)
    }

    fn is_match(&self, path: &str) -> bool {
        self.0.is_match(path)
    }
}
