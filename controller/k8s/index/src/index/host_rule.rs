use super::{hostrule_not_found, Index, Kind};
use crate::validation;
use std::collections::BTreeSet;
use vsync_controller_core::ResourceId;
use vsync_controller_k8s_api::RuleStatus;

impl Index {
    /// Resolves a host rule to every route advertising its FQDN.
    ///
    /// When the FQDN changes, routes under the previous FQDN are included too. A host rule that
    /// fails validation resolves to nothing and leaves its previous FQDN mapping in place.
    pub(super) fn host_rule_change(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Option<Vec<String>> {
        let id = ResourceId::new(namespace, name);
        let hostrule = id.key();
        let crds = self.relations.crds();

        let (fqdn, old_fqdn, valid) = match self.host_rules.get(namespace, name) {
            Err(error) => {
                tracing::debug!(key, %error, "HostRule deleted");
                (crds.delete_hostrule_fqdn(&hostrule), None, false)
            }
            Ok(rule) => {
                let current = rule.status.as_ref();
                if let Err(error) = validation::validate_host_rule(&id, rule, crds) {
                    tracing::warn!(key, %error, "Rejecting HostRule");
                    self.update_rule_status(
                        Kind::HostRule,
                        &id,
                        current,
                        RuleStatus::rejected(&error),
                    );
                    self.propagate_host_rule(&hostrule, false);
                    return None;
                }

                // The previous mapping must be removed before the new one is installed.
                let fqdn = rule.spec.virtual_host.fqdn.clone();
                let old_fqdn = crds.delete_hostrule_fqdn(&hostrule);
                crds.update_fqdn_hostrule(&fqdn, &hostrule);
                self.update_rule_status(Kind::HostRule, &id, current, RuleStatus::accepted());

                let old_fqdn = old_fqdn.filter(|old| *old != fqdn);
                (Some(fqdn), old_fqdn, true)
            }
        };

        self.propagate_host_rule(&hostrule, valid);

        let mut routes = BTreeSet::new();
        for fqdn in fqdn.iter().chain(old_fqdn.iter()) {
            match self.hosts.routes_for_host(fqdn) {
                Some(found) => routes.extend(found),
                None => tracing::debug!(key, %fqdn, "Couldn't find hostpath info"),
            }
        }

        let routes = routes.into_iter().collect::<Vec<_>>();
        tracing::info!(key, %hostrule, ?routes, "Routes to compute via HostRule");
        Some(routes)
    }

    /// Reflects a host rule's validity on the HTTP rules that extend it.
    ///
    /// An invalid or deleted host rule rejects them. A valid one re-accepts those that were
    /// rejected and are otherwise valid.
    fn propagate_host_rule(&self, hostrule: &str, valid: bool) {
        let Some(paths) = self.relations.crds().host_http_rules(hostrule) else {
            return;
        };

        let http_rules = paths.into_values().collect::<BTreeSet<_>>();
        for rule in http_rules {
            let Some(rule_id) = ResourceId::parse(&rule) else {
                continue;
            };
            let Ok(http_rule) = self.http_rules.get(&rule_id.namespace, &rule_id.name) else {
                continue;
            };

            let current = http_rule.status.as_ref();
            if !valid {
                self.update_rule_status(
                    Kind::HttpRule,
                    &rule_id,
                    current,
                    hostrule_not_found(hostrule),
                );
            } else if current.is_some_and(RuleStatus::is_rejected)
                && validation::validate_http_rule(http_rule).is_ok()
            {
                self.update_rule_status(Kind::HttpRule, &rule_id, current, RuleStatus::accepted());
            }
        }
    }
}
