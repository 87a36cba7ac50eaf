//! Closed interval of addresses of one family.

use std::cmp::Ordering;
use std::fmt;

use ipnet::IpNet;

use crate::error::{IpamError, Result};
use crate::ip::{Family, Ip};

/// A contiguous block of addresses, inclusive on both ends.
///
/// Both endpoints are guaranteed to be of the same family with
/// `start <= end`; the constructors enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    start: Ip,
    end: Ip,
}

impl IpRange {
    /// Builds a range from its endpoints.
    ///
    /// # Errors
    /// [`IpamError::FamilyMismatch`] when the endpoints disagree on
    /// family, [`IpamError::InvalidRange`] when `start > end`.
    pub fn new(start: Ip, end: Ip) -> Result<IpRange> {
        match start.compare(&end)? {
            Ordering::Greater => Err(IpamError::InvalidRange(format!("{start}..{end}"))),
            _ => Ok(IpRange { start, end }),
        }
    }

    /// A range holding exactly one address.
    #[must_use]
    pub fn single(ip: Ip) -> IpRange {
        IpRange { start: ip, end: ip }
    }

    /// The whole block of a CIDR, network and broadcast included.
    #[must_use]
    pub fn from_cidr(net: &IpNet) -> IpRange {
        IpRange {
            start: Ip::from(net.network()),
            end: Ip::from(net.broadcast()),
        }
    }

    // Endpoints are trusted to be validated by the caller.
    pub(crate) fn span(start: Ip, end: Ip) -> IpRange {
        debug_assert!(start.family() == end.family() && start.value() <= end.value());
        IpRange { start, end }
    }

    /// First address of the range.
    #[must_use]
    pub fn start(&self) -> Ip {
        self.start
    }

    /// Last address of the range.
    #[must_use]
    pub fn end(&self) -> Ip {
        self.end
    }

    /// Family of both endpoints.
    #[must_use]
    pub fn family(&self) -> Family {
        self.start.family()
    }

    /// Number of addresses in the range (`end - start + 1`).
    ///
    /// Saturates at `u128::MAX` for the full IPv6 space, the only
    /// count a 128-bit integer cannot hold.
    #[must_use]
    pub fn count(&self) -> u128 {
        (self.end.value() - self.start.value()).saturating_add(1)
    }

    /// Whether `ip` falls inside the range. An address of the other
    /// family is never contained.
    #[must_use]
    pub fn contains(&self, ip: Ip) -> bool {
        ip.family() == self.family()
            && self.start.value() <= ip.value()
            && ip.value() <= self.end.value()
    }

    /// Whether the two ranges share at least one address.
    #[must_use]
    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.family() == other.family()
            && self.start.value() <= other.end.value()
            && other.start.value() <= self.end.value()
    }

    /// Whether the two ranges touch with a gap of zero addresses.
    #[must_use]
    pub fn adjacent(&self, other: &IpRange) -> bool {
        if self.family() != other.family() {
            return false;
        }
        self.end.add(1) == other.start || other.end.add(1) == self.start
    }

    /// Union of two ranges, when they overlap or are adjacent.
    /// Returns `None` when the ranges are not mergeable.
    #[must_use]
    pub fn merge(&self, other: &IpRange) -> Option<IpRange> {
        if !self.overlaps(other) && !self.adjacent(other) {
            return None;
        }
        let start = if self.start.value() <= other.start.value() {
            self.start
        } else {
            other.start
        };
        let end = if self.end.value() >= other.end.value() {
            self.end
        } else {
            other.end
        };
        Some(IpRange { start, end })
    }

    /// Removes one address, yielding the zero, one or two remainders.
    /// Returns `None` when `ip` is not in the range.
    #[must_use]
    pub fn remove(&self, ip: Ip) -> Option<Vec<IpRange>> {
        if !self.contains(ip) {
            return None;
        }
        let mut rest = Vec::with_capacity(2);
        if ip != self.start {
            rest.push(IpRange::span(self.start, ip.sub(1)));
        }
        if ip != self.end {
            rest.push(IpRange::span(ip.add(1), self.end));
        }
        Some(rest)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}
