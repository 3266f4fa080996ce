use super::RuleStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Applies settings to a set of path prefixes under a [`super::HostRule`]'s FQDN.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vsync.io",
    version = "v1alpha1",
    kind = "HttpRule",
    status = "RuleStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HttpRuleSpec {
    /// The host rule this rule extends, either `namespace/name` or a name in the rule's own
    /// namespace.
    pub hostrule: String,

    #[serde(default)]
    pub paths: Vec<HttpRulePath>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HttpRulePath {
    /// A path prefix. Every path advertised under the FQDN that starts with this prefix is
    /// governed by the rule.
    pub target: String,
}
