//! Relationship stores for the vsync ingress controller.
//!
//! The controller translates "a backing resource changed" into "these routing-intent objects must
//! be recomputed". To do that it keeps a set of in-memory indices that describe how resources
//! refer to each other:
//!
//! ```text
//! [ Service ] <- [ Ingress / HTTPRoute ] -> [ Secret ]
//!                      |
//!                 host / path  <- [ HostRule (fqdn) ] <- [ HttpRule (paths) ]
//! ```
//!
//! None of the types in this crate know about the Kubernetes API. Keys are always built from a
//! [`ResourceId`] as `namespace/name`.
//!
//! Every store is safe to share between tasks. Individual operations are atomic per key, but
//! sequences of operations are not transactional; a concurrent reader may observe the state
//! between two calls.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod hostname;
mod id;
mod relations;
mod store;

pub use self::{
    hostname::{HostPathStore, PathRoutes},
    id::ResourceId,
    relations::{CrdMappings, RelationshipStore, RouteKind, RouteMappings},
    store::ObjectMapStore,
};
