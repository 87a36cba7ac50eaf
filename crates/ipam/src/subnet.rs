//! Per-subnet allocators.
//!
//! A [`Subnet`] composes up to two single-family allocators (one per
//! configured address family) plus the pools attached to the subnet.
//! Dual-stack allocation is atomic: either the owner ends up holding
//! an address in every configured family, or in none.

use std::collections::HashMap;
use std::str::FromStr;

use ipnet::IpNet;
use tracing::{info, warn};

use crate::error::{IpamError, Result};
use crate::ip::{Family, Ip};
use crate::pool::IpPool;
use crate::range::IpRange;
use crate::range_list::{IpRangeList, parse_entry};
use crate::status::{FamilyUsage, PoolUsage, SubnetUsage};

/// One granted address binding. Value data only: an allocation never
/// points back at its allocator and is never mutated in place; a
/// retry for the same owner key gets the same record back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Unique consumer key, e.g. `"<pod>.<namespace>"` or a VIP name.
    pub owner: String,
    /// Family of the granted address.
    pub family: Family,
    /// The granted address.
    pub ip: Ip,
    /// Pool the address was drawn from, when pool-bound.
    pub pool: Option<String>,
    /// Opaque caller pass-through; the engine does not interpret it.
    pub mac: Option<String>,
}

/// Parameters of an allocation request.
#[derive(Debug, Clone, Default)]
pub struct AllocationRequest {
    /// Explicitly requested IPv4 address, if any.
    pub requested_v4: Option<Ip>,
    /// Explicitly requested IPv6 address, if any.
    pub requested_v6: Option<Ip>,
    /// Pool to draw from when no explicit address is requested.
    pub pool: Option<String>,
    /// Namespace of the owner, checked against pool allow-lists.
    pub namespace: String,
    /// Opaque MAC pass-through, echoed back on the reply.
    pub mac: Option<String>,
}

/// Addresses granted by one allocate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationReply {
    /// Granted IPv4 address, when the subnet has a v4 block.
    pub v4: Option<Ip>,
    /// Granted IPv6 address, when the subnet has a v6 block.
    pub v6: Option<Ip>,
    /// The request's MAC, passed through untouched.
    pub mac: Option<String>,
}

/// Allocator state for one family of one subnet.
///
/// Invariant: `available`, `using` and `reserved` are pairwise
/// disjoint and their union is exactly the CIDR block. `reserved` is
/// fixed at construction (network/broadcast address, gateway, declared
/// exclude entries) and never flows back into `available`.
#[derive(Debug, Clone)]
pub struct FamilyAllocator {
    subnet: String,
    family: Family,
    net: IpNet,
    cidr: IpRange,
    reserved: IpRangeList,
    available: IpRangeList,
    using: IpRangeList,
    allocations: HashMap<String, Allocation>,
    owner_by_ip: HashMap<Ip, String>,
}

impl FamilyAllocator {
    fn new(subnet: &str, net: IpNet, gateway: Option<Ip>, excludes: &IpRangeList) -> Result<FamilyAllocator> {
        let family = match net {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        };
        let cidr = IpRange::from_cidr(&net);
        let whole = IpRangeList::from_range(cidr);

        // Exclude entries outside the CIDR are ignored, as the
        // controller's spec validation is advisory only.
        let mut reserved = excludes.intersect(&whole);
        reserved.add(cidr.start());
        if family == Family::V4 {
            reserved.add(cidr.end());
        }
        if let Some(gw) = gateway {
            if gw.family() != family {
                return Err(IpamError::FamilyMismatch {
                    left: family,
                    right: gw.family(),
                });
            }
            if !cidr.contains(gw) {
                return Err(IpamError::OutOfRange {
                    subnet: subnet.to_string(),
                    address: gw,
                });
            }
            reserved.add(gw);
        }

        Ok(FamilyAllocator {
            subnet: subnet.to_string(),
            family,
            net,
            cidr,
            available: whole.separate(&reserved),
            reserved,
            using: IpRangeList::new(),
            allocations: HashMap::new(),
            owner_by_ip: HashMap::new(),
        })
    }

    /// The family this allocator manages.
    #[must_use]
    pub fn family(&self) -> Family {
        self.family
    }

    /// The CIDR block, as parsed.
    #[must_use]
    pub fn net(&self) -> IpNet {
        self.net
    }

    /// Whether `ip` falls inside the CIDR block.
    #[must_use]
    pub fn contains(&self, ip: Ip) -> bool {
        self.cidr.contains(ip)
    }

    /// The allocation currently held by `owner`, if any.
    #[must_use]
    pub fn allocation(&self, owner: &str) -> Option<&Allocation> {
        self.allocations.get(owner)
    }

    /// Owner currently holding `ip`, if any.
    #[must_use]
    pub fn owner_of(&self, ip: Ip) -> Option<&str> {
        self.owner_by_ip.get(&ip).map(String::as_str)
    }

    fn allocate(
        &mut self,
        owner: &str,
        requested: Option<Ip>,
        pool: Option<&mut IpPool>,
        namespace: &str,
        mac: Option<&str>,
    ) -> Result<Ip> {
        // Idempotent retry: the existing binding is returned unchanged.
        if let Some(existing) = self.allocations.get(owner) {
            return Ok(existing.ip);
        }

        let mut pool_name = None;
        // A pool silent on this family falls through to dynamic
        // allocation from the whole free set.
        let ip = if let Some(ip) = requested {
            if ip.family() != self.family {
                return Err(IpamError::FamilyMismatch {
                    left: self.family,
                    right: ip.family(),
                });
            }
            if !self.cidr.contains(ip) {
                return Err(IpamError::OutOfRange {
                    subnet: self.subnet.clone(),
                    address: ip,
                });
            }
            if self.reserved.contains(ip) {
                return Err(IpamError::Excluded {
                    subnet: self.subnet.clone(),
                    address: ip,
                });
            }
            if let Some(holder) = self.owner_by_ip.get(&ip) {
                return Err(IpamError::Conflict {
                    subnet: self.subnet.clone(),
                    address: ip,
                    owner: holder.clone(),
                });
            }
            if !self.available.remove(ip) {
                return Err(IpamError::InvariantViolation {
                    subnet: self.subnet.clone(),
                    detail: format!("{ip} is neither available, using nor excluded"),
                });
            }
            ip
        } else if let Some(pool) = pool.filter(|p| p.has_family(self.family)) {
            let ip = pool.allocate(self.family, namespace, &self.available)?;
            pool_name = Some(pool.name().to_string());
            if !self.available.remove(ip) {
                return Err(IpamError::InvariantViolation {
                    subnet: self.subnet.clone(),
                    detail: format!("pool {} handed out unavailable {ip}", pool.name()),
                });
            }
            ip
        } else {
            self.available
                .allocate_lowest()
                .ok_or_else(|| IpamError::Exhausted {
                    subnet: self.subnet.clone(),
                    family: self.family,
                })?
        };

        self.using.add(ip);
        self.owner_by_ip.insert(ip, owner.to_string());
        self.allocations.insert(
            owner.to_string(),
            Allocation {
                owner: owner.to_string(),
                family: self.family,
                ip,
                pool: pool_name,
                mac: mac.map(str::to_string),
            },
        );
        self.verify()?;
        Ok(ip)
    }

    // Carries a binding over from a previous incarnation of this
    // allocator. Fails when the address no longer fits the space.
    fn adopt(&mut self, allocation: &Allocation) -> bool {
        if self.allocations.contains_key(&allocation.owner) {
            return false;
        }
        if !self.available.remove(allocation.ip) {
            return false;
        }
        self.using.add(allocation.ip);
        self.owner_by_ip
            .insert(allocation.ip, allocation.owner.clone());
        self.allocations
            .insert(allocation.owner.clone(), allocation.clone());
        true
    }

    fn release(&mut self, owner: &str) -> Option<Ip> {
        let allocation = self.allocations.remove(owner)?;
        self.owner_by_ip.remove(&allocation.ip);
        self.using.remove(allocation.ip);
        self.available.add(allocation.ip);
        Some(allocation.ip)
    }

    /// Checks the completeness invariant. A failure here means the
    /// range algebra itself went wrong; the caller must treat it as
    /// fatal rather than repair the sets.
    pub fn verify(&self) -> Result<()> {
        let pairs = [
            ("available", &self.available, "using", &self.using),
            ("available", &self.available, "excluded", &self.reserved),
            ("using", &self.using, "excluded", &self.reserved),
        ];
        for (a_name, a, b_name, b) in pairs {
            let overlap = a.intersect(b);
            if !overlap.is_empty() {
                return Err(IpamError::InvariantViolation {
                    subnet: self.subnet.clone(),
                    detail: format!("{a_name} and {b_name} overlap: {overlap}"),
                });
            }
        }
        let union = self.available.merge(&self.using).merge(&self.reserved);
        if union != IpRangeList::from_range(self.cidr) {
            return Err(IpamError::InvariantViolation {
                subnet: self.subnet.clone(),
                detail: format!("available/using/excluded do not cover {}: {union}", self.net),
            });
        }
        Ok(())
    }

    /// Projects this family's state into status counters.
    #[must_use]
    pub fn usage(&self) -> FamilyUsage {
        FamilyUsage::project(&self.available, &self.using)
    }

    pub(crate) fn available(&self) -> &IpRangeList {
        &self.available
    }

    pub(crate) fn using(&self) -> &IpRangeList {
        &self.using
    }
}

/// Splits mixed textual entries (`addr`, `lo..hi`, CIDR) by family.
pub(crate) fn split_entries_by_family<S: AsRef<str>>(
    entries: &[S],
) -> Result<(Vec<String>, Vec<String>)> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for entry in entries {
        let range = parse_entry(entry.as_ref())?;
        match range.family() {
            Family::V4 => v4.push(entry.as_ref().to_string()),
            Family::V6 => v6.push(entry.as_ref().to_string()),
        }
    }
    Ok((v4, v6))
}

fn parse_cidr_blocks(cidr: &str) -> Result<(Option<IpNet>, Option<IpNet>)> {
    let mut v4 = None;
    let mut v6 = None;
    for block in cidr.split(',') {
        let net = IpNet::from_str(block.trim())
            .map_err(|_| IpamError::InvalidCidr(block.to_string()))?;
        let slot = match net {
            IpNet::V4(_) => &mut v4,
            IpNet::V6(_) => &mut v6,
        };
        if slot.is_some() {
            return Err(IpamError::InvalidCidr(cidr.to_string()));
        }
        *slot = Some(net.trunc());
    }
    if v4.is_none() && v6.is_none() {
        return Err(IpamError::InvalidCidr(cidr.to_string()));
    }
    Ok((v4, v6))
}

fn parse_gateways(gateway: &str) -> Result<(Option<Ip>, Option<Ip>)> {
    let mut v4 = None;
    let mut v6 = None;
    for part in gateway.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let ip = Ip::from_str(part)?;
        let slot = match ip.family() {
            Family::V4 => &mut v4,
            Family::V6 => &mut v6,
        };
        if slot.is_some() {
            return Err(IpamError::InvalidAddress(gateway.to_string()));
        }
        *slot = Some(ip);
    }
    Ok((v4, v6))
}

/// Dual-stack coordinator for one subnet: up to two single-family
/// allocators plus the pools attached to the subnet.
#[derive(Debug, Clone)]
pub struct Subnet {
    name: String,
    cidr_spec: String,
    gateway_spec: String,
    exclude_spec: Vec<String>,
    v4: Option<FamilyAllocator>,
    v6: Option<FamilyAllocator>,
    pools: HashMap<String, IpPool>,
}

impl Subnet {
    /// Builds a subnet from its spec fields. `cidr` is a single block
    /// or a comma-joined dual-stack pair; `gateway` likewise (empty
    /// string for none); `exclude_ips` entries are single addresses or
    /// `lo..hi` ranges of either family.
    ///
    /// # Errors
    /// [`IpamError::InvalidCidr`] on malformed or duplicated-family
    /// blocks; parse and family errors from the gateway and exclude
    /// entries.
    pub fn new<S: AsRef<str>>(
        name: &str,
        cidr: &str,
        gateway: &str,
        exclude_ips: &[S],
    ) -> Result<Subnet> {
        let (v4_net, v6_net) = parse_cidr_blocks(cidr)?;
        let (v4_gw, v6_gw) = parse_gateways(gateway)?;
        let (v4_excludes, v6_excludes) = split_entries_by_family(exclude_ips)?;

        let v4 = v4_net
            .map(|net| {
                let excludes = IpRangeList::from_entries(&v4_excludes)?;
                FamilyAllocator::new(name, net, v4_gw, &excludes)
            })
            .transpose()?;
        let v6 = v6_net
            .map(|net| {
                let excludes = IpRangeList::from_entries(&v6_excludes)?;
                FamilyAllocator::new(name, net, v6_gw, &excludes)
            })
            .transpose()?;
        if v4_gw.is_some() && v4.is_none() || v6_gw.is_some() && v6.is_none() {
            return Err(IpamError::InvalidAddress(gateway.to_string()));
        }

        Ok(Subnet {
            name: name.to_string(),
            cidr_spec: cidr.to_string(),
            gateway_spec: gateway.to_string(),
            exclude_spec: exclude_ips.iter().map(|s| s.as_ref().to_string()).collect(),
            v4,
            v6,
            pools: HashMap::new(),
        })
    }

    /// The subnet's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the spec fields match what this subnet was built from.
    #[must_use]
    pub fn spec_matches<S: AsRef<str>>(&self, cidr: &str, gateway: &str, exclude_ips: &[S]) -> bool {
        self.cidr_spec == cidr
            && self.gateway_spec == gateway
            && self.exclude_spec.len() == exclude_ips.len()
            && self
                .exclude_spec
                .iter()
                .zip(exclude_ips)
                .all(|(a, b)| a == b.as_ref())
    }

    /// The per-family allocator, when that family is configured.
    #[must_use]
    pub fn family(&self, family: Family) -> Option<&FamilyAllocator> {
        match family {
            Family::V4 => self.v4.as_ref(),
            Family::V6 => self.v6.as_ref(),
        }
    }

    /// Whether `ip` falls inside either configured CIDR block.
    #[must_use]
    pub fn contains(&self, ip: Ip) -> bool {
        self.family(ip.family()).is_some_and(|a| a.contains(ip))
    }

    /// Addresses `owner` currently holds in this subnet, v4 first.
    #[must_use]
    pub fn owner_addresses(&self, owner: &str) -> Vec<Ip> {
        [self.v4.as_ref(), self.v6.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|a| a.allocation(owner).map(|allocation| allocation.ip))
            .collect()
    }

    /// Owner holding `ip` in this subnet, when it differs from
    /// `owner`. Used by the controller to detect racing static
    /// requests before committing a pod spec.
    #[must_use]
    pub fn owned_by_other(&self, ip: Ip, owner: &str) -> Option<String> {
        self.family(ip.family())
            .and_then(|a| a.owner_of(ip))
            .filter(|holder| *holder != owner)
            .map(str::to_string)
    }

    /// Grants `owner` an address in every configured family.
    ///
    /// The v4 allocator is tried first, then v6. When the second
    /// family fails after the first succeeded, the freshly granted
    /// first allocation is rolled back before the error is returned:
    /// an owner holds addresses in all configured families or in none.
    ///
    /// Calling again for an owner that already holds addresses returns
    /// the existing bindings unchanged.
    ///
    /// # Errors
    /// See [`IpamError`]; `Exhausted` and `Conflict` are the kinds
    /// expected under normal operation.
    pub fn allocate(&mut self, owner: &str, request: &AllocationRequest) -> Result<AllocationReply> {
        if let Some(pool_name) = &request.pool {
            if !self.pools.contains_key(pool_name) {
                return Err(IpamError::PoolNotFound {
                    subnet: self.name.clone(),
                    pool: pool_name.clone(),
                });
            }
        }
        for (requested, allocator) in [
            (request.requested_v4, self.v4.as_ref()),
            (request.requested_v6, self.v6.as_ref()),
        ] {
            if let Some(ip) = requested {
                if allocator.is_none() {
                    return Err(IpamError::OutOfRange {
                        subnet: self.name.clone(),
                        address: ip,
                    });
                }
            }
        }

        let mac = request.mac.as_deref();
        let namespace = request.namespace.as_str();

        let v4_held_before = self
            .v4
            .as_ref()
            .is_some_and(|a| a.allocation(owner).is_some());

        let mut v4_ip = None;
        if let Some(allocator) = self.v4.as_mut() {
            let pool = request
                .pool
                .as_ref()
                .and_then(|name| self.pools.get_mut(name));
            v4_ip = Some(allocator.allocate(owner, request.requested_v4, pool, namespace, mac)?);
        }

        let mut v6_ip = None;
        if let Some(allocator) = self.v6.as_mut() {
            let pool = request
                .pool
                .as_ref()
                .and_then(|name| self.pools.get_mut(name));
            match allocator.allocate(owner, request.requested_v6, pool, namespace, mac) {
                Ok(ip) => v6_ip = Some(ip),
                Err(e) => {
                    // Roll back a v4 address granted by this very call,
                    // never one the owner held from an earlier call.
                    if !v4_held_before {
                        if let Some(v4) = self.v4.as_mut() {
                            v4.release(owner);
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(
            subnet = %self.name,
            owner,
            v4 = v4_ip.map(|ip| ip.to_string()),
            v6 = v6_ip.map(|ip| ip.to_string()),
            pool = request.pool.as_deref(),
            "allocated address"
        );
        Ok(AllocationReply {
            v4: v4_ip,
            v6: v6_ip,
            mac: request.mac.clone(),
        })
    }

    /// Releases whatever `owner` holds in either family. Unknown
    /// owners are a successful no-op.
    pub fn release(&mut self, owner: &str) -> (Option<Ip>, Option<Ip>) {
        let v4 = self.v4.as_mut().and_then(|a| a.release(owner));
        let v6 = self.v6.as_mut().and_then(|a| a.release(owner));
        if v4.is_some() || v6.is_some() {
            info!(
                subnet = %self.name,
                owner,
                v4 = v4.map(|ip| ip.to_string()),
                v6 = v6.map(|ip| ip.to_string()),
                "released address"
            );
        }
        (v4, v6)
    }

    /// Creates or replaces a pool. Replacing resets the pool's
    /// round-robin cursor; existing allocations are untouched, as
    /// pools only affect future allocate calls.
    ///
    /// # Errors
    /// Parse failures of the address entries, and
    /// [`IpamError::PoolConflict`] when the declared addresses overlap
    /// another pool of this subnet.
    pub fn add_or_update_pool<S: AsRef<str>>(
        &mut self,
        name: &str,
        ips: &[S],
        namespaces: Vec<String>,
    ) -> Result<()> {
        let pool = IpPool::new(name, ips, namespaces)?;
        for (other_name, other) in &self.pools {
            if other_name == name {
                continue;
            }
            for family in [Family::V4, Family::V6] {
                let overlap = pool.ips(family).intersect(other.ips(family));
                if !overlap.is_empty() {
                    return Err(IpamError::PoolConflict {
                        pool: name.to_string(),
                        other: other_name.clone(),
                        overlap: overlap.to_string(),
                    });
                }
            }
        }
        for family in [Family::V4, Family::V6] {
            if let Some(allocator) = self.family(family) {
                let whole = IpRangeList::from_range(IpRange::from_cidr(&allocator.net()));
                let outside = pool.ips(family).separate(&whole);
                if !outside.is_empty() {
                    warn!(
                        subnet = %self.name,
                        pool = name,
                        %outside,
                        "ippool declares addresses outside the subnet CIDR"
                    );
                }
            }
        }
        info!(subnet = %self.name, pool = name, "ippool added or updated");
        self.pools.insert(name.to_string(), pool);
        Ok(())
    }

    /// Removes a pool. Existing allocations drawn from it survive.
    pub fn remove_pool(&mut self, name: &str) {
        if self.pools.remove(name).is_some() {
            info!(subnet = %self.name, pool = name, "ippool removed");
        }
    }

    /// Looks up a pool by name.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&IpPool> {
        self.pools.get(name)
    }

    /// Re-applies the spec. A changed CIDR, gateway or exclude list
    /// rebuilds the allocators; surviving allocations whose address
    /// still fits the new space are carried over, the rest are dropped
    /// with a warning for the controller to reconcile.
    ///
    /// # Errors
    /// Same as [`Subnet::new`]. On error the previous state is kept.
    pub fn update<S: AsRef<str>>(
        &mut self,
        cidr: &str,
        gateway: &str,
        exclude_ips: &[S],
    ) -> Result<()> {
        if self.spec_matches(cidr, gateway, exclude_ips) {
            return Ok(());
        }

        let mut rebuilt = Subnet::new(&self.name, cidr, gateway, exclude_ips)?;
        rebuilt.pools = std::mem::take(&mut self.pools);

        for old in [&self.v4, &self.v6] {
            let Some(old) = old else { continue };
            for allocation in old.allocations.values() {
                let target = match allocation.family {
                    Family::V4 => rebuilt.v4.as_mut(),
                    Family::V6 => rebuilt.v6.as_mut(),
                };
                let carried = target.is_some_and(|allocator| allocator.adopt(allocation));
                if !carried {
                    warn!(
                        subnet = %self.name,
                        owner = %allocation.owner,
                        ip = %allocation.ip,
                        "allocation does not fit the updated subnet spec, dropping"
                    );
                }
            }
        }

        info!(subnet = %self.name, cidr, "subnet spec updated");
        *self = rebuilt;
        Ok(())
    }

    /// Verifies the completeness invariant of every configured family.
    pub fn verify(&self) -> Result<()> {
        if let Some(v4) = &self.v4 {
            v4.verify()?;
        }
        if let Some(v6) = &self.v6 {
            v6.verify()?;
        }
        Ok(())
    }

    /// Projects allocator state into status counters for both
    /// families.
    #[must_use]
    pub fn usage(&self) -> SubnetUsage {
        SubnetUsage {
            v4: self.v4.as_ref().map(FamilyAllocator::usage),
            v6: self.v6.as_ref().map(FamilyAllocator::usage),
        }
    }

    /// Projects one pool's slice of this subnet's state: the pool's
    /// declared addresses intersected with the subnet's available and
    /// in-use sets.
    #[must_use]
    pub fn pool_usage(&self, name: &str) -> Option<PoolUsage> {
        let pool = self.pools.get(name)?;
        let project = |family: Family| {
            self.family(family).map(|allocator| {
                FamilyUsage::project(
                    &pool.ips(family).intersect(allocator.available()),
                    &pool.ips(family).intersect(allocator.using()),
                )
            })
        };
        Some(PoolUsage {
            v4: project(Family::V4),
            v6: project(Family::V6),
        })
    }
}
