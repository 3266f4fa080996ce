//! Kubernetes-facing index for the vsync controller.
//!
//! The [`Index`] is fed by kubert watches. Every applied or deleted object is run through the
//! change resolver for its kind, which updates the shared relationship stores and enqueues a
//! [`Resync`] for each route that must be rebuilt.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
mod index;
pub mod metrics;
pub mod validation;


pub use self::{
    cache::{NotFound, ObjectCache},
    index::{Index, Kind, Resync, SharedIndex},
    metrics::IndexMetrics,
    validation::ValidationError,
};
