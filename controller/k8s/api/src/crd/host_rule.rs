use super::RuleStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Binds settings to the virtual service serving a single FQDN.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vsync.io",
    version = "v1alpha1",
    kind = "HostRule",
    status = "RuleStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HostRuleSpec {
    pub virtual_host: VirtualHost,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct VirtualHost {
    pub fqdn: String,
}
