use crate::{reconcile, LoadBalancerEntry, StatusCache, VsMetadata};
use ahash::AHashSet as HashSet;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::{sync::Arc, thread};
use vsync_controller_core::ResourceId;
use vsync_controller_k8s_api::IngressLoadBalancerIngress;

mod controller;

type Entry = IngressLoadBalancerIngress;

fn entries(pairs: &[(&str, &str)]) -> Vec<Entry> {
    pairs
        .iter()
        .map(|(vip, hostname)| Entry::new(vip, hostname))
        .collect()
}

fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(vip, hostname)| (vip.to_string(), hostname.to_string()))
        .collect()
}

fn hosts(hosts: &[&str]) -> Vec<String> {
    hosts.iter().map(|h| h.to_string()).collect()
}

#[rstest]
#[case::empty_status(
    &[],
    &[("10.0.0.1", "a.com")],
    &["a.com"],
    &[("10.0.0.1", "a.com")],
)]
#[case::vip_change(
    &[("10.0.0.1", "a.com")],
    &[("10.0.0.2", "a.com")],
    &["a.com"],
    &[("10.0.0.2", "a.com")],
)]
#[case::host_removed_from_spec(
    &[("10.0.0.1", "a.com"), ("10.0.0.1", "b.com")],
    &[("10.0.0.1", "a.com")],
    &["a.com"],
    &[("10.0.0.1", "a.com")],
)]
#[case::unrelated_host_kept(
    &[("10.0.0.9", "b.com")],
    &[("10.0.0.1", "a.com")],
    &["a.com", "b.com"],
    &[("10.0.0.9", "b.com"), ("10.0.0.1", "a.com")],
)]
#[case::desired_host_not_in_spec(
    &[],
    &[("10.0.0.1", "a.com"), ("10.0.0.1", "c.com")],
    &["a.com"],
    &[("10.0.0.1", "a.com")],
)]
#[case::duplicate_current_entries(
    &[("10.0.0.1", "b.com"), ("10.0.0.2", "b.com"), ("10.0.0.3", "b.com")],
    &[],
    &["b.com"],
    &[("10.0.0.1", "b.com")],
)]
#[case::hostless_rule(
    &[("10.0.0.1", "")],
    &[("10.0.0.2", "")],
    &[""],
    &[("10.0.0.2", "")],
)]
fn reconciles_status(
    #[case] current: &[(&str, &str)],
    #[case] desired: &[(&str, &str)],
    #[case] spec_hosts: &[&str],
    #[case] expected: &[(&str, &str)],
) {
    let result = reconcile(&entries(current), &pairs(desired), &hosts(spec_hosts));
    assert_eq!(result, entries(expected));
}

#[rstest]
#[case(&[], &[("10.0.0.1", "a.com")])]
#[case(&[("10.0.0.1", "a.com"), ("10.0.0.1", "a.com")], &[("10.0.0.2", "a.com")])]
#[case(&[("10.0.0.1", "b.com")], &[("10.0.0.2", "a.com"), ("10.0.0.3", "b.com")])]
fn reconcile_is_idempotent(#[case] current: &[(&str, &str)], #[case] desired: &[(&str, &str)]) {
    let spec_hosts = hosts(&["a.com", "b.com"]);
    let once = reconcile(&entries(current), &pairs(desired), &spec_hosts);
    let twice = reconcile(&once, &pairs(desired), &spec_hosts);
    assert_eq!(once, twice);
}

#[test]
fn reconcile_never_duplicates_hostnames() {
    let spec_hosts = hosts(&["a.com", "b.com", "c.com"]);
    let steps = [
        pairs(&[("10.0.0.1", "a.com"), ("10.0.0.1", "b.com")]),
        pairs(&[("10.0.0.2", "b.com"), ("10.0.0.2", "b.com")]),
        pairs(&[("10.0.0.3", "c.com"), ("10.0.0.3", "a.com")]),
        pairs(&[]),
    ];

    let mut status = entries(&[("10.0.0.0", "a.com"), ("10.0.0.0", "a.com")]);
    for desired in &steps {
        status = reconcile(&status, desired, &spec_hosts);
        let mut seen = HashSet::new();
        for entry in &status {
            assert!(
                seen.insert(entry.hostname.clone()),
                "duplicate hostname in {status:?}"
            );
        }
    }
}

#[test]
fn status_cache_overwrites() {
    let cache = StatusCache::default();
    let id = ResourceId::new("ns-0", "ing-0");
    let first = VsMetadata {
        vip: "10.0.0.1".to_string(),
        hostnames: hosts(&["a.com"]),
    };
    let second = VsMetadata {
        vip: "10.0.0.2".to_string(),
        hostnames: hosts(&["b.com"]),
    };

    cache.save(&id, first.clone());
    assert!(cache.is_synced(&id, &first));

    cache.save(&id, second.clone());
    assert_eq!(cache.get(&id), Some(second));
    assert!(!cache.is_synced(&id, &first));

    cache.delete(&id);
    assert_eq!(cache.get(&id), None);
}

#[test]
fn status_cache_is_shareable() {
    let cache = StatusCache::shared();
    let handles = (0..4)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for j in 0..100 {
                    let id = ResourceId::new("ns-0", format!("ing-{i}-{j}"));
                    cache.save(&id, VsMetadata::default());
                    assert!(cache.get(&id).is_some());
                    if j % 2 == 0 {
                        cache.delete(&id);
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    let remaining = (0..4)
        .flat_map(|i| (0..100).map(move |j| ResourceId::new("ns-0", format!("ing-{i}-{j}"))))
        .filter(|id| cache.get(id).is_some())
        .count();
    assert_eq!(remaining, 200);
}
