use crate::Error;
use ahash::AHashSet as HashSet;
use vsync_controller_k8s_api::{IngressLoadBalancerIngress, LoadBalancerIngress};

/// A single address entry in a resource's `status.loadBalancer.ingress` list.
pub trait LoadBalancerEntry: Clone {
    fn new(vip: &str, hostname: &str) -> Self;

    fn hostname(&self) -> Option<&str>;
}

impl LoadBalancerEntry for IngressLoadBalancerIngress {
    fn new(vip: &str, hostname: &str) -> Self {
        Self {
            ip: Some(vip.to_string()),
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }
    }

    fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

impl LoadBalancerEntry for LoadBalancerIngress {
    fn new(vip: &str, hostname: &str) -> Self {
        Self {
            ip: Some(vip.to_string()),
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }
    }

    fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

/// Merges the desired `(vip, hostname)` pairs into a resource's current status entries.
///
/// Entries for a desired hostname are replaced, and entries whose hostname is no longer in
/// `spec_hosts` are dropped. An entry without a hostname is treated as having the empty
/// hostname. The result holds at most one entry per hostname; the first one wins.
pub fn reconcile<E: LoadBalancerEntry>(
    current: &[E],
    desired: &[(String, String)],
    spec_hosts: &[String],
) -> Vec<E> {
    let desired_hosts = desired
        .iter()
        .map(|(_, hostname)| hostname.as_str())
        .collect::<HashSet<_>>();

    let retained = current
        .iter()
        .filter(|entry| !desired_hosts.contains(entry_host(*entry)))
        .cloned();
    let added = desired
        .iter()
        .map(|(vip, hostname)| E::new(vip, hostname));

    let spec_hosts = spec_hosts.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    retained
        .chain(added)
        .filter(|entry| {
            let hostname = entry_host(entry);
            spec_hosts.contains(hostname) && seen.insert(hostname.to_string())
        })
        .collect()
}

/// Drops every entry for the given hostnames.
pub fn remove_hosts<E: LoadBalancerEntry>(current: &[E], hostnames: &[String]) -> Vec<E> {
    let hostnames = hostnames.iter().map(String::as_str).collect::<HashSet<_>>();
    current
        .iter()
        .filter(|entry| !hostnames.contains(entry_host(*entry)))
        .cloned()
        .collect()
}

/// Builds the single entry a `LoadBalancer` Service's status carries.
pub fn service_status(vip: &str, hostnames: &[String]) -> Result<LoadBalancerIngress, Error> {
    match hostnames {
        [hostname] => Ok(LoadBalancerEntry::new(vip, hostname)),
        _ => Err(Error::InvalidHostnames(hostnames.len())),
    }
}

fn entry_host<E: LoadBalancerEntry>(entry: &E) -> &str {
    entry.hostname().unwrap_or_default()
}
