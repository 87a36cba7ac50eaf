//! Projection of allocator state into CRD status fields.
//!
//! Counts are exact `u128` internally and only become `f64` here, at
//! the API boundary, matching the number type the status schema uses
//! (exact up to 2^53, approximate for the giant v6 sets beyond that).
//! Range strings are the canonical comma-joined form and are stable
//! for identical state, so controllers can diff before patching.

use chrono::Utc;
use crds::{IPPoolStatus, SubnetStatus};

use crate::range_list::IpRangeList;

/// Status counters for one address family.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FamilyUsage {
    /// Number of addresses still free.
    pub available_ips: f64,
    /// Number of addresses handed out.
    pub using_ips: f64,
    /// Canonical textual form of the free set.
    pub available_range: String,
    /// Canonical textual form of the in-use set.
    pub using_range: String,
}

impl FamilyUsage {
    pub(crate) fn project(available: &IpRangeList, using: &IpRangeList) -> FamilyUsage {
        FamilyUsage {
            available_ips: available.count() as f64,
            using_ips: using.count() as f64,
            available_range: available.to_string(),
            using_range: using.to_string(),
        }
    }
}

/// Per-family usage of a whole subnet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubnetUsage {
    /// IPv4 counters, when the subnet has a v4 block.
    pub v4: Option<FamilyUsage>,
    /// IPv6 counters, when the subnet has a v6 block.
    pub v6: Option<FamilyUsage>,
}

impl SubnetUsage {
    /// Renders the counters as a `Subnet` CRD status. Fields of an
    /// unconfigured family are zero and empty rather than absent, as
    /// the status schema has no notion of a missing family.
    #[must_use]
    pub fn to_status(&self) -> SubnetStatus {
        let v4 = self.v4.clone().unwrap_or_default();
        let v6 = self.v6.clone().unwrap_or_default();
        SubnetStatus {
            v4_available_ips: v4.available_ips,
            v4_available_ip_range: v4.available_range,
            v4_using_ips: v4.using_ips,
            v4_using_ip_range: v4.using_range,
            v6_available_ips: v6.available_ips,
            v6_available_ip_range: v6.available_range,
            v6_using_ips: v6.using_ips,
            v6_using_ip_range: v6.using_range,
            last_reconciled: Some(Utc::now()),
        }
    }
}

/// Per-family usage of one pool's slice of its subnet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolUsage {
    /// IPv4 counters, when the subnet has a v4 block.
    pub v4: Option<FamilyUsage>,
    /// IPv6 counters, when the subnet has a v6 block.
    pub v6: Option<FamilyUsage>,
}

impl PoolUsage {
    /// Renders the counters as an `IPPool` CRD status.
    #[must_use]
    pub fn to_status(&self) -> IPPoolStatus {
        let v4 = self.v4.clone().unwrap_or_default();
        let v6 = self.v6.clone().unwrap_or_default();
        IPPoolStatus {
            v4_available_ips: v4.available_ips,
            v4_available_ip_range: v4.available_range,
            v4_using_ips: v4.using_ips,
            v4_using_ip_range: v4.using_range,
            v6_available_ips: v6.available_ips,
            v6_available_ip_range: v6.available_range,
            v6_using_ips: v6.using_ips,
            v6_using_ip_range: v6.using_range,
        }
    }
}
