#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod crd;
pub mod gateway;
pub mod ingress;

pub use self::crd::{
    HostRule, HostRuleSpec, HttpRule, HttpRulePath, HttpRuleSpec, RuleState, RuleStatus,
    VirtualHost,
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Endpoints, LoadBalancerIngress, Secret, Service},
        networking::v1::{Ingress, IngressLoadBalancerIngress, IngressSpec},
    },
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error,
};
