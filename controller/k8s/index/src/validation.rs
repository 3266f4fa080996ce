use ahash::AHashSet as HashSet;
use vsync_controller_core::{CrdMappings, ResourceId};
use vsync_controller_k8s_api::{HostRule, HttpRule};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("fqdn must not be empty")]
    EmptyFqdn,

    #[error("fqdn {0:?} is not a valid DNS name")]
    InvalidFqdn(String),

    #[error("fqdn {fqdn} is already claimed by hostrule {owner}")]
    DuplicateFqdn { fqdn: String, owner: String },

    #[error("hostrule reference must not be empty")]
    MissingHostRule,

    #[error("hostrule reference {0:?} must be a name or namespace/name")]
    InvalidHostRule(String),

    #[error("at least one path must be specified")]
    NoPaths,

    #[error("path target {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("path target {0} is specified more than once")]
    DuplicatePath(String),
}

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Checks a host rule's FQDN, including that no other host rule already owns it.
pub fn validate_host_rule(
    id: &ResourceId,
    rule: &HostRule,
    crds: &CrdMappings,
) -> Result<(), ValidationError> {
    let fqdn = rule.spec.virtual_host.fqdn.as_str();
    if fqdn.is_empty() {
        return Err(ValidationError::EmptyFqdn);
    }
    if !is_dns_name(fqdn) {
        return Err(ValidationError::InvalidFqdn(fqdn.to_string()));
    }

    let key = id.key();
    match crds.fqdn_hostrule(fqdn) {
        Some(owner) if owner != key => Err(ValidationError::DuplicateFqdn {
            fqdn: fqdn.to_string(),
            owner,
        }),
        _ => Ok(()),
    }
}

pub fn validate_http_rule(rule: &HttpRule) -> Result<(), ValidationError> {
    let hostrule = rule.spec.hostrule.as_str();
    if hostrule.is_empty() {
        return Err(ValidationError::MissingHostRule);
    }
    if hostrule.contains('/') && ResourceId::parse(hostrule).is_none() {
        return Err(ValidationError::InvalidHostRule(hostrule.to_string()));
    }

    if rule.spec.paths.is_empty() {
        return Err(ValidationError::NoPaths);
    }
    let mut targets = HashSet::new();
    for path in &rule.spec.paths {
        let target = path.target.as_str();
        if !target.starts_with('/') {
            return Err(ValidationError::InvalidPath(target.to_string()));
        }
        if !targets.insert(target) {
            return Err(ValidationError::DuplicatePath(target.to_string()));
        }
    }

    Ok(())
}

/// Accepts dot-separated DNS labels, optionally under a leading `*.` wildcard.
fn is_dns_name(name: &str) -> bool {
    if name.len() > MAX_NAME_LEN {
        return false;
    }
    let name = name.strip_prefix("*.").unwrap_or(name);
    name.split('.').all(is_dns_label)
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsync_controller_k8s_api::{HostRuleSpec, HttpRulePath, HttpRuleSpec, VirtualHost};

    fn host_rule(fqdn: &str) -> HostRule {
        HostRule::new(
            "hr-0",
            HostRuleSpec {
                virtual_host: VirtualHost {
                    fqdn: fqdn.to_string(),
                },
            },
        )
    }

    fn http_rule(hostrule: &str, targets: &[&str]) -> HttpRule {
        HttpRule::new(
            "rr-0",
            HttpRuleSpec {
                hostrule: hostrule.to_string(),
                paths: targets
                    .iter()
                    .map(|t| HttpRulePath {
                        target: t.to_string(),
                    })
                    .collect(),
            },
        )
    }

    #[test]
    fn host_rule_fqdn() {
        let id = ResourceId::new("ns-0", "hr-0");
        let crds = CrdMappings::default();

        assert_eq!(validate_host_rule(&id, &host_rule("a.com"), &crds), Ok(()));
        assert_eq!(validate_host_rule(&id, &host_rule("*.a.com"), &crds), Ok(()));
        assert_eq!(
            validate_host_rule(&id, &host_rule(""), &crds),
            Err(ValidationError::EmptyFqdn)
        );
        for fqdn in ["a..com", "-a.com", "a_b.com", "a.com."] {
            assert_eq!(
                validate_host_rule(&id, &host_rule(fqdn), &crds),
                Err(ValidationError::InvalidFqdn(fqdn.to_string())),
                "{fqdn}"
            );
        }
    }

    #[test]
    fn host_rule_fqdn_must_be_unclaimed() {
        let id = ResourceId::new("ns-0", "hr-0");
        let crds = CrdMappings::default();
        crds.update_fqdn_hostrule("a.com", "ns-0/hr-0");
        assert_eq!(validate_host_rule(&id, &host_rule("a.com"), &crds), Ok(()));

        crds.update_fqdn_hostrule("b.com", "ns-1/hr-1");
        assert_eq!(
            validate_host_rule(&id, &host_rule("b.com"), &crds),
            Err(ValidationError::DuplicateFqdn {
                fqdn: "b.com".to_string(),
                owner: "ns-1/hr-1".to_string(),
            })
        );
    }

    #[test]
    fn http_rule_paths() {
        assert_eq!(validate_http_rule(&http_rule("hr-0", &["/foo"])), Ok(()));
        assert_eq!(
            validate_http_rule(&http_rule("ns-1/hr-0", &["/foo", "/bar"])),
            Ok(())
        );
        assert_eq!(
            validate_http_rule(&http_rule("", &["/foo"])),
            Err(ValidationError::MissingHostRule)
        );
        assert_eq!(
            validate_http_rule(&http_rule("ns-1/", &["/foo"])),
            Err(ValidationError::InvalidHostRule("ns-1/".to_string()))
        );
        assert_eq!(
            validate_http_rule(&http_rule("hr-0", &[])),
            Err(ValidationError::NoPaths)
        );
        assert_eq!(
            validate_http_rule(&http_rule("hr-0", &["foo"])),
            Err(ValidationError::InvalidPath("foo".to_string()))
        );
        assert_eq!(
            validate_http_rule(&http_rule("hr-0", &["/foo", "/foo"])),
            Err(ValidationError::DuplicatePath("/foo".to_string()))
        );
    }
}
