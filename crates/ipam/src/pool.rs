//! Named address pools layered over a subnet's available space.
//!
//! A pool is a view, not an owner: it restricts which addresses may
//! satisfy a request, in a declared order, optionally scoped to a set
//! of namespaces. Pools hand out addresses round-robin: the scan
//! starts just after the last address assigned and wraps, so
//! operator-visible static addressing cycles predictably through the
//! declared list.
//!
//! Declared entries are kept as ranges and never expanded into
//! individual addresses; a pool naming a whole v6 /64 costs the same
//! as one naming three addresses.

use crate::error::{IpamError, Result};
use crate::ip::{Family, Ip};
use crate::range::IpRange;
use crate::range_list::{IpRangeList, parse_entry};

/// One family's slice of a pool: the declared ranges in order, the
/// merged membership set, and the round-robin cursor as a position
/// (range index, offset into that range) just past the last grant.
#[derive(Debug, Clone, Default)]
struct FamilyRing {
    ranges: Vec<IpRange>,
    set: IpRangeList,
    cursor_range: usize,
    cursor_offset: u128,
}

impl FamilyRing {
    fn push(&mut self, range: IpRange) {
        self.ranges.push(range);
        self.set.add_range(range);
    }

    /// Next declared address present in `available`, scanning from the
    /// cursor and wrapping. Each declared range is probed with set
    /// algebra, so the walk is linear in the number of ranges, not in
    /// their width.
    fn next(&mut self, available: &IpRangeList) -> Option<Ip> {
        let n = self.ranges.len();
        if n == 0 {
            return None;
        }
        for step in 0..=n {
            let idx = (self.cursor_range + step) % n;
            let r = self.ranges[idx];
            let (lo, hi) = if step == 0 {
                if self.cursor_offset >= r.count() {
                    continue;
                }
                (r.start().add(self.cursor_offset), r.end())
            } else if step == n {
                // Full wrap: the part of the cursor range the first
                // probe skipped.
                if self.cursor_offset == 0 {
                    break;
                }
                (r.start(), r.start().add(self.cursor_offset - 1))
            } else {
                (r.start(), r.end())
            };
            if let Some(ip) = available.first_in(IpRange::span(lo, hi)) {
                self.cursor_range = idx;
                self.cursor_offset = ip.value() - r.start().value() + 1;
                if self.cursor_offset >= r.count() {
                    self.cursor_range = (idx + 1) % n;
                    self.cursor_offset = 0;
                }
                return Some(ip);
            }
        }
        None
    }
}

/// A named, ordered subset of a subnet's address space.
#[derive(Debug, Clone)]
pub struct IpPool {
    name: String,
    namespaces: Vec<String>,
    v4: FamilyRing,
    v6: FamilyRing,
}

impl IpPool {
    /// Builds a pool from its declared entries (`addr`, `lo..hi` or
    /// CIDR), preserving declaration order.
    ///
    /// # Errors
    /// Parse failures of any entry.
    pub fn new<S: AsRef<str>>(name: &str, entries: &[S], namespaces: Vec<String>) -> Result<IpPool> {
        let mut pool = IpPool {
            name: name.to_string(),
            namespaces,
            v4: FamilyRing::default(),
            v6: FamilyRing::default(),
        };
        for entry in entries {
            let range = parse_entry(entry.as_ref())?;
            match range.family() {
                Family::V4 => pool.v4.push(range),
                Family::V6 => pool.v6.push(range),
            }
        }
        Ok(pool)
    }

    /// The pool's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace allow-list; empty means any namespace.
    #[must_use]
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// The pool's membership set for one family.
    #[must_use]
    pub fn ips(&self, family: Family) -> &IpRangeList {
        match family {
            Family::V4 => &self.v4.set,
            Family::V6 => &self.v6.set,
        }
    }

    /// Whether the pool declares any address of this family.
    #[must_use]
    pub fn has_family(&self, family: Family) -> bool {
        !self.ips(family).is_empty()
    }

    /// Whether `namespace` may allocate from this pool.
    #[must_use]
    pub fn allows(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.iter().any(|ns| ns == namespace)
    }

    /// Picks the next address of the pool present in `available`.
    ///
    /// The declared list is scanned starting just after the last
    /// address handed out, wrapping at the end; addresses no longer in
    /// `available` are skipped. Pool exhaustion is therefore
    /// independent of subnet exhaustion.
    ///
    /// # Errors
    /// [`IpamError::PoolMismatch`] when the namespace is not allowed,
    /// [`IpamError::PoolExhausted`] when no declared address is
    /// available.
    pub fn allocate(
        &mut self,
        family: Family,
        namespace: &str,
        available: &IpRangeList,
    ) -> Result<Ip> {
        if !self.allows(namespace) {
            return Err(IpamError::PoolMismatch {
                pool: self.name.clone(),
                namespace: namespace.to_string(),
            });
        }

        let ring = match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        };
        ring.next(available).ok_or_else(|| IpamError::PoolExhausted {
            pool: self.name.clone(),
            family,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ip {
        s.parse().unwrap()
    }

    fn available(entries: &[&str]) -> IpRangeList {
        IpRangeList::from_entries(entries).unwrap()
    }

    #[test]
    fn allocates_in_declared_order() {
        let mut pool = IpPool::new(
            "p",
            &["10.16.0.50", "10.16.0.10..10.16.0.12"],
            vec![],
        )
        .unwrap();
        let avail = available(&["10.16.0.0..10.16.0.255"]);

        let granted: Vec<_> = (0..4)
            .map(|_| pool.allocate(Family::V4, "ns", &avail).unwrap())
            .collect();
        assert_eq!(
            granted,
            vec![
                ip("10.16.0.50"),
                ip("10.16.0.10"),
                ip("10.16.0.11"),
                ip("10.16.0.12")
            ]
        );
    }

    #[test]
    fn round_robin_with_skip() {
        let mut pool =
            IpPool::new("p", &["10.16.0.20", "10.16.0.21", "10.16.0.22"], vec![]).unwrap();
        let avail = available(&["10.16.0.0..10.16.0.255"]);

        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.16.0.20"));
        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.16.0.21"));

        // 10.16.0.22 no longer available: wraps past it back to .20
        let narrowed = available(&["10.16.0.20", "10.16.0.21"]);
        assert_eq!(
            pool.allocate(Family::V4, "ns", &narrowed).unwrap(),
            ip("10.16.0.20")
        );
    }

    #[test]
    fn wide_range_entries_are_not_materialized() {
        // A whole v6 /64 as one entry: construction and allocation
        // must be instant and memory-flat.
        let mut pool = IpPool::new("p", &["fd00::/64"], vec![]).unwrap();
        assert_eq!(pool.ips(Family::V6).count(), 1u128 << 64);

        let avail = available(&["fd00::100..fd00::1ff"]);
        assert_eq!(
            pool.allocate(Family::V6, "ns", &avail).unwrap(),
            ip("fd00::100")
        );
        assert_eq!(
            pool.allocate(Family::V6, "ns", &avail).unwrap(),
            ip("fd00::101")
        );
    }

    #[test]
    fn wide_v4_block_allocates_from_cursor() {
        let mut pool = IpPool::new("p", &["10.0.0.0/12"], vec![]).unwrap();
        assert_eq!(pool.ips(Family::V4).count(), 1 << 20);

        let avail = available(&["10.0.0.1..10.0.0.2"]);
        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.0.0.1"));
        // Cursor sits at 10.0.0.2; the remaining address is found
        // without touching the rest of the block.
        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.0.0.2"));

        // Nothing of the pool left in the free set: the full wrap is
        // still a bounded number of range probes.
        let drained = available(&["11.0.0.1"]);
        let err = pool.allocate(Family::V4, "ns", &drained).unwrap_err();
        assert!(matches!(err, IpamError::PoolExhausted { .. }));
    }

    #[test]
    fn cursor_wraps_within_a_single_range() {
        let mut pool = IpPool::new("p", &["10.16.0.4..10.16.0.6"], vec![]).unwrap();
        let avail = available(&["10.16.0.0..10.16.0.255"]);

        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.16.0.4"));
        assert_eq!(pool.allocate(Family::V4, "ns", &avail).unwrap(), ip("10.16.0.5"));

        // .6 is gone; the wrap probe revisits the skipped prefix.
        let narrowed = available(&["10.16.0.4..10.16.0.5"]);
        assert_eq!(
            pool.allocate(Family::V4, "ns", &narrowed).unwrap(),
            ip("10.16.0.4")
        );
    }

    #[test]
    fn namespace_allow_list() {
        let mut pool = IpPool::new("p", &["10.16.0.20"], vec!["prod".to_string()]).unwrap();
        let avail = available(&["10.16.0.0..10.16.0.255"]);

        let err = pool.allocate(Family::V4, "dev", &avail).unwrap_err();
        assert!(matches!(err, IpamError::PoolMismatch { .. }));
        assert!(pool.allocate(Family::V4, "prod", &avail).is_ok());
    }

    #[test]
    fn exhaustion_is_independent_of_subnet() {
        let mut pool = IpPool::new("p", &["10.16.0.20", "10.16.0.21"], vec![]).unwrap();
        // subnet still has plenty of space, just not the pool's
        let avail = available(&["10.16.0.100..10.16.0.200"]);
        let err = pool.allocate(Family::V4, "ns", &avail).unwrap_err();
        assert!(matches!(err, IpamError::PoolExhausted { .. }));
    }

    #[test]
    fn dual_family_entries_split() {
        let pool = IpPool::new("p", &["10.16.0.20", "fd00::20", "fd00::21"], vec![]).unwrap();
        assert!(pool.has_family(Family::V4));
        assert!(pool.has_family(Family::V6));
        assert_eq!(pool.ips(Family::V6).count(), 2);
    }
}
