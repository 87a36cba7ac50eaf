//! Set-algebra tests for [`IpRangeList`].

use std::str::FromStr;

use crate::ip::Ip;
use crate::range_list::IpRangeList;

fn ip(s: &str) -> Ip {
    Ip::from_str(s).expect("test address parses")
}

fn list(entries: &[&str]) -> IpRangeList {
    IpRangeList::from_entries(entries).expect("test entries parse")
}

#[test]
fn from_entries_normalizes_overlap_and_adjacency() {
    let l = list(&["10.0.0.1..10.0.0.5", "10.0.0.6", "10.0.0.4..10.0.0.9"]);
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.9");
    assert_eq!(l.len(), 1);
    assert_eq!(l.count(), 9);
}

#[test]
fn from_entries_accepts_cidr_and_single() {
    let l = list(&["192.168.1.0/30", "192.168.1.9"]);
    assert_eq!(l.to_string(), "192.168.1.0..192.168.1.3,192.168.1.9");
    assert_eq!(l.count(), 5);
}

#[test]
fn from_entries_rejects_mixed_families() {
    assert!(IpRangeList::from_entries(&["10.0.0.1", "fd00::1"]).is_err());
}

#[test]
fn from_entries_rejects_inverted_range() {
    assert!(IpRangeList::from_entries(&["10.0.0.9..10.0.0.1"]).is_err());
}

#[test]
fn add_merges_with_both_neighbors() {
    let mut l = list(&["10.0.0.1..10.0.0.3", "10.0.0.5..10.0.0.7"]);
    assert!(l.add(ip("10.0.0.4")));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.7");
    assert_eq!(l.len(), 1);
}

#[test]
fn add_is_idempotent() {
    let mut l = list(&["10.0.0.1..10.0.0.3"]);
    assert!(!l.add(ip("10.0.0.2")));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.3");
}

#[test]
fn remove_splits_interior_address() {
    let mut l = list(&["10.0.0.1..10.0.0.9"]);
    assert!(l.remove(ip("10.0.0.5")));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.4,10.0.0.6..10.0.0.9");
    assert!(!l.contains(ip("10.0.0.5")));
    assert_eq!(l.count(), 8);
}

#[test]
fn remove_of_absent_address_is_noop() {
    let mut l = list(&["10.0.0.1..10.0.0.3"]);
    assert!(!l.remove(ip("10.0.0.9")));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.3");
}

#[test]
fn remove_endpoint_shrinks_range() {
    let mut l = list(&["10.0.0.1..10.0.0.3"]);
    assert!(l.remove(ip("10.0.0.1")));
    assert_eq!(l.to_string(), "10.0.0.2..10.0.0.3");
    assert!(l.remove(ip("10.0.0.3")));
    assert_eq!(l.to_string(), "10.0.0.2");
    assert!(l.remove(ip("10.0.0.2")));
    assert!(l.is_empty());
    assert_eq!(l.to_string(), "");
}

#[test]
fn add_range_and_remove_range_renormalize() {
    let mut l = list(&["10.0.0.1..10.0.0.3"]);
    l.add_range(crate::range_list::parse_entry("10.0.0.4..10.0.0.9").expect("range"));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.9");

    l.remove_range(crate::range_list::parse_entry("10.0.0.3..10.0.0.5").expect("range"));
    assert_eq!(l.to_string(), "10.0.0.1..10.0.0.2,10.0.0.6..10.0.0.9");
}

#[test]
fn allocate_lowest_walks_in_order() {
    let mut l = list(&["10.0.0.8", "10.0.0.1..10.0.0.2"]);
    assert_eq!(l.allocate_lowest(), Some(ip("10.0.0.1")));
    assert_eq!(l.allocate_lowest(), Some(ip("10.0.0.2")));
    assert_eq!(l.allocate_lowest(), Some(ip("10.0.0.8")));
    assert_eq!(l.allocate_lowest(), None);
}

#[test]
fn separate_cuts_overlaps() {
    let l = list(&["10.0.0.1..10.0.0.10"]);
    let cut = list(&["10.0.0.3..10.0.0.4", "10.0.0.8"]);
    assert_eq!(
        l.separate(&cut).to_string(),
        "10.0.0.1..10.0.0.2,10.0.0.5..10.0.0.7,10.0.0.9..10.0.0.10"
    );
}

#[test]
fn separate_consumes_fully_covered_ranges() {
    let l = list(&["10.0.0.3..10.0.0.5", "10.0.0.20"]);
    let cut = list(&["10.0.0.0/24"]);
    assert!(l.separate(&cut).is_empty());
}

#[test]
fn separate_ignores_disjoint_cut() {
    let l = list(&["10.0.0.1..10.0.0.5"]);
    let cut = list(&["10.0.1.1..10.0.1.5"]);
    assert_eq!(l.separate(&cut), l);
}

#[test]
fn separate_across_families_returns_self() {
    let l = list(&["10.0.0.1..10.0.0.5"]);
    let cut = list(&["fd00::1"]);
    assert_eq!(l.separate(&cut), l);
}

#[test]
fn merge_joins_adjacent_ranges() {
    let a = list(&["10.0.0.1..10.0.0.4"]);
    let b = list(&["10.0.0.5..10.0.0.9", "10.0.0.20"]);
    assert_eq!(a.merge(&b).to_string(), "10.0.0.1..10.0.0.9,10.0.0.20");
}

#[test]
fn merge_collapses_contained_ranges() {
    let a = list(&["10.0.0.1..10.0.0.9"]);
    let b = list(&["10.0.0.3..10.0.0.4"]);
    assert_eq!(a.merge(&b), a);
}

#[test]
fn intersect_keeps_common_addresses() {
    let a = list(&["10.0.0.1..10.0.0.10", "10.0.0.30"]);
    let b = list(&["10.0.0.5..10.0.0.40"]);
    assert_eq!(
        a.intersect(&b).to_string(),
        "10.0.0.5..10.0.0.10,10.0.0.30"
    );
}

#[test]
fn intersect_of_disjoint_sets_is_empty() {
    let a = list(&["10.0.0.1..10.0.0.4"]);
    let b = list(&["10.0.1.1..10.0.1.4"]);
    assert!(a.intersect(&b).is_empty());
}

#[test]
fn intersect_across_families_is_empty() {
    let a = list(&["10.0.0.1..10.0.0.4"]);
    let b = list(&["fd00::/120"]);
    assert!(a.intersect(&b).is_empty());
}

#[test]
fn count_is_exact_beyond_64_bits() {
    let l = list(&["fd00::/32"]);
    assert_eq!(l.count(), 1u128 << 96);
    assert!(l.contains(ip("fd00::ffff:ffff:ffff:ffff")));
}

#[test]
fn display_is_stable_for_identical_state() {
    let entries = ["10.0.0.8", "10.0.0.1..10.0.0.2"];
    let a = list(&entries);
    let b = list(&entries);
    assert_eq!(a.to_string(), b.to_string());

    // A canonical rendering parses back into an equal set.
    let rendered = a.to_string();
    let parts: Vec<&str> = rendered.split(',').collect();
    assert_eq!(list(&parts), a);
}
