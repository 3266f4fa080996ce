//! Writes the controller's view of the world back into resource status.
//!
//! The index emits [`Update`]s onto a bounded queue; a single [`Controller`] drains it and
//! performs the writes while this replica holds the write lease.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
mod controller;
mod reconcile;

#[cfg(test)]
mod tests;

pub use self::{
    cache::{StatusCache, VsMetadata},
    controller::{channel, Controller, ControllerMetrics, Error, Receiver, Sender, Update},
    reconcile::{reconcile, remove_hosts, service_status, LoadBalancerEntry},
};
