//! Normalized sets of address ranges.
//!
//! An [`IpRangeList`] keeps its ranges sorted by start, disjoint and
//! non-adjacent (touching ranges are merged eagerly), so membership is
//! a binary search and the serialized form is canonical: identical
//! sets always render to byte-identical strings, which keeps repeated
//! status projections from churning downstream watchers.

use std::fmt;
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{IpamError, Result};
use crate::ip::{Family, Ip};
use crate::range::IpRange;

/// A normalized, sorted set of disjoint address ranges of one family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpRangeList {
    ranges: Vec<IpRange>,
}

/// Parses one textual entry: a bare address, a `lo..hi` range, or a
/// CIDR block.
pub(crate) fn parse_entry(entry: &str) -> Result<IpRange> {
    if let Some((lo, hi)) = entry.split_once("..") {
        let start = Ip::from_str(lo)?;
        let end = Ip::from_str(hi)?;
        IpRange::new(start, end).map_err(|e| match e {
            IpamError::InvalidRange(_) => IpamError::InvalidRange(entry.to_string()),
            other => other,
        })
    } else if entry.contains('/') {
        let net = IpNet::from_str(entry).map_err(|_| IpamError::InvalidCidr(entry.to_string()))?;
        Ok(IpRange::from_cidr(&net))
    } else {
        Ok(IpRange::single(Ip::from_str(entry)?))
    }
}

impl IpRangeList {
    /// An empty set.
    #[must_use]
    pub fn new() -> IpRangeList {
        IpRangeList::default()
    }

    /// A set covering exactly one range.
    #[must_use]
    pub fn from_range(range: IpRange) -> IpRangeList {
        IpRangeList {
            ranges: vec![range],
        }
    }

    /// Builds a set from textual entries (`addr`, `lo..hi` or CIDR),
    /// merging overlaps as it goes. All entries must share one family.
    ///
    /// # Errors
    /// Parse failures, plus [`IpamError::FamilyMismatch`] on mixed
    /// entries.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<IpRangeList> {
        let mut ret = IpRangeList::new();
        for entry in entries {
            let range = parse_entry(entry.as_ref())?;
            if let Some(first) = ret.ranges.first() {
                if first.family() != range.family() {
                    return Err(IpamError::FamilyMismatch {
                        left: first.family(),
                        right: range.family(),
                    });
                }
            }
            ret = ret.merge(&IpRangeList::from_range(range));
        }
        Ok(ret)
    }

    /// Number of ranges (not addresses) in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the set holds no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The `i`-th range in ascending order.
    #[must_use]
    pub fn at(&self, i: usize) -> Option<&IpRange> {
        self.ranges.get(i)
    }

    /// Total number of addresses in the set, saturating at `u128::MAX`.
    #[must_use]
    pub fn count(&self) -> u128 {
        self.ranges
            .iter()
            .fold(0u128, |acc, r| acc.saturating_add(r.count()))
    }

    fn family(&self) -> Option<Family> {
        self.ranges.first().map(IpRange::family)
    }

    /// Binary search for the range containing `ip`. `Ok` carries the
    /// index of the containing range, `Err` the insertion point.
    fn locate(&self, ip: Ip) -> std::result::Result<usize, usize> {
        if self.family().is_some_and(|f| f != ip.family()) {
            return Err(self.ranges.len());
        }
        self.ranges.binary_search_by(|r| {
            if r.start().value() > ip.value() {
                std::cmp::Ordering::Greater
            } else if r.end().value() < ip.value() {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
    }

    /// Whether `ip` is in the set.
    #[must_use]
    pub fn contains(&self, ip: Ip) -> bool {
        self.locate(ip).is_ok()
    }

    /// Inserts a single address, merging with touching neighbors.
    /// Returns `false` when the address was already present or belongs
    /// to a different family than the set.
    pub fn add(&mut self, ip: Ip) -> bool {
        if self.family().is_some_and(|f| f != ip.family()) {
            return false;
        }
        let n = match self.locate(ip) {
            Ok(_) => return false,
            Err(n) => n,
        };

        let extends_left = n > 0 && self.ranges[n - 1].end().add(1) == ip;
        let extends_right = n < self.ranges.len() && self.ranges[n].start().sub(1) == ip;
        match (extends_left, extends_right) {
            (true, true) => {
                let merged = IpRange::span(self.ranges[n - 1].start(), self.ranges[n].end());
                self.ranges[n - 1] = merged;
                self.ranges.remove(n);
            }
            (true, false) => {
                self.ranges[n - 1] = IpRange::span(self.ranges[n - 1].start(), ip);
            }
            (false, true) => {
                self.ranges[n] = IpRange::span(ip, self.ranges[n].end());
            }
            (false, false) => {
                self.ranges.insert(n, IpRange::single(ip));
            }
        }
        true
    }

    /// Removes a single address, splitting the range that held it.
    /// Returns `false` when the address was not present.
    pub fn remove(&mut self, ip: Ip) -> bool {
        let Ok(n) = self.locate(ip) else {
            return false;
        };
        // contains(ip) held, so remove() cannot return None
        let rest = self.ranges[n].remove(ip).unwrap_or_default();
        self.ranges.splice(n..=n, rest);
        true
    }

    /// Inserts a whole range, merging with whatever it touches.
    pub fn add_range(&mut self, range: IpRange) {
        *self = self.merge_range(range);
    }

    /// Removes every address of `range` from the set.
    pub fn remove_range(&mut self, range: IpRange) {
        *self = self.separate(&IpRangeList::from_range(range));
    }

    /// Smallest set member inside `range`, if any.
    #[must_use]
    pub fn first_in(&self, range: IpRange) -> Option<Ip> {
        self.intersect(&IpRangeList::from_range(range))
            .at(0)
            .map(IpRange::start)
    }

    /// Removes and returns the smallest address in the set.
    pub fn allocate_lowest(&mut self) -> Option<Ip> {
        let lowest = self.ranges.first()?.start();
        self.remove(lowest);
        Some(lowest)
    }

    /// Set difference: addresses in `self` but not in `other`.
    #[must_use]
    pub fn separate(&self, other: &IpRangeList) -> IpRangeList {
        if self.is_empty() || other.is_empty() || self.family() != other.family() {
            return self.clone();
        }

        let mut out = Vec::new();
        for r in &self.ranges {
            let mut start = r.start();
            let mut consumed = false;
            for x in &other.ranges {
                if x.end().value() < start.value() {
                    continue;
                }
                if x.start().value() > r.end().value() {
                    break;
                }
                if x.start().value() > start.value() {
                    out.push(IpRange::span(start, x.start().sub(1)));
                }
                if x.end().value() >= r.end().value() {
                    consumed = true;
                    break;
                }
                start = x.end().add(1);
            }
            if !consumed {
                out.push(IpRange::span(start, r.end()));
            }
        }
        IpRangeList { ranges: out }
    }

    /// Set union, renormalizing overlaps and adjacency.
    #[must_use]
    pub fn merge(&self, other: &IpRangeList) -> IpRangeList {
        let mut all: Vec<IpRange> = self
            .ranges
            .iter()
            .chain(other.ranges.iter())
            .copied()
            .collect();
        all.sort_by(|a, b| a.start().value().cmp(&b.start().value()));

        let mut out: Vec<IpRange> = Vec::with_capacity(all.len());
        for r in all {
            match out.last_mut() {
                Some(last)
                    if r.start().value() <= last.end().value()
                        || last.end().add(1) == r.start() =>
                {
                    if r.end().value() > last.end().value() {
                        *last = IpRange::span(last.start(), r.end());
                    }
                }
                _ => out.push(r),
            }
        }
        IpRangeList { ranges: out }
    }

    /// Set union with a single range.
    #[must_use]
    pub fn merge_range(&self, range: IpRange) -> IpRangeList {
        self.merge(&IpRangeList::from_range(range))
    }

    /// Set intersection: addresses present in both sets.
    #[must_use]
    pub fn intersect(&self, other: &IpRangeList) -> IpRangeList {
        self.separate(&self.separate(other))
    }
}

impl fmt::Display for IpRangeList {
    /// Canonical form: `entry(,entry)*`, each entry `a` or `lo..hi`,
    /// ascending, no spaces; the empty set renders as the empty
    /// string. External status fields depend on this exact format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}
