use super::{hostrule_not_found, Index, Kind};
use crate::validation;
use std::collections::BTreeSet;
use vsync_controller_core::ResourceId;
use vsync_controller_k8s_api::RuleStatus;

impl Index {
    /// Resolves an HTTP rule to every route advertising a path under one of its prefixes.
    ///
    /// Both the rule's current prefixes (under its host rule's FQDN) and the prefixes it governed
    /// before this change (under the FQDN they were registered for) are matched, so routes that
    /// leave the rule's scope are rebuilt as well.
    pub(super) fn http_rule_change(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let id = ResourceId::new(namespace, name);
        let httprule = id.key();
        let crds = self.relations.crds();

        let previous = crds
            .http_rule_paths(&httprule)
            .map(|(hostrule, paths)| (crds.hostrule_fqdn(&hostrule), paths));

        let current = match self.http_rules.get(namespace, name) {
            Err(error) => {
                tracing::debug!(key, %error, "HttpRule deleted");
                crds.remove_http_rule(&httprule);
                None
            }
            Ok(rule) => {
                let status = rule.status.as_ref();
                if let Err(error) = validation::validate_http_rule(rule) {
                    tracing::warn!(key, %error, "Rejecting HttpRule");
                    self.update_rule_status(
                        Kind::HttpRule,
                        &id,
                        status,
                        RuleStatus::rejected(&error),
                    );
                    return None;
                }

                let hostrule = ResourceId::qualify(&rule.spec.hostrule, namespace).key();
                let paths = rule
                    .spec
                    .paths
                    .iter()
                    .map(|path| path.target.clone())
                    .collect::<BTreeSet<_>>();
                let targets = paths.iter().map(String::as_str);
                crds.replace_http_rule_paths(&httprule, &hostrule, targets);

                let fqdn = crds.hostrule_fqdn(&hostrule);
                let desired = match fqdn {
                    Some(_) => RuleStatus::accepted(),
                    None => hostrule_not_found(&hostrule),
                };
                self.update_rule_status(Kind::HttpRule, &id, status, desired);
                Some((fqdn, paths))
            }
        };

        let mut routes = BTreeSet::new();
        for (fqdn, prefixes) in current.iter().chain(previous.iter()) {
            let Some(fqdn) = fqdn else {
                continue;
            };
            let prefixes = prefixes.iter().map(String::as_str);
            match self.hosts.routes_matching_prefixes(fqdn, prefixes) {
                Some(found) => routes.extend(found),
                None => tracing::debug!(key, %fqdn, "Couldn't find hostpath info"),
            }
        }

        let routes = routes.into_iter().collect::<Vec<_>>();
        tracing::info!(key, %httprule, ?routes, "Routes to compute via HttpRule");
        Some(routes)
    }
}
