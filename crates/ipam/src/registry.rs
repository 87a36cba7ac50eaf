//! Process-wide registry of subnets.
//!
//! The registry map is guarded by a read-write lock; each subnet sits
//! behind its own mutex so allocations against different subnets never
//! contend. Lock order is always registry first, then subnet, and the
//! registry lock is dropped before a subnet lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::error::{IpamError, Result};
use crate::ip::Ip;
use crate::status::{PoolUsage, SubnetUsage};
use crate::subnet::{AllocationReply, AllocationRequest, Subnet};

/// Thread-safe IPAM engine entry point.
#[derive(Debug, Default)]
pub struct Ipam {
    subnets: RwLock<HashMap<String, Arc<Mutex<Subnet>>>>,
}

impl Ipam {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Ipam {
        Ipam::default()
    }

    fn subnet(&self, name: &str) -> Result<Arc<Mutex<Subnet>>> {
        self.subnets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| IpamError::SubnetNotFound(name.to_string()))
    }

    /// Registers a subnet, or re-applies its spec when it already
    /// exists. An unchanged spec is a no-op; a changed one rebuilds
    /// the address space, carrying over allocations that still fit.
    ///
    /// # Errors
    /// Parse and family errors from the spec fields. A failed update
    /// leaves the existing subnet untouched.
    pub fn add_or_update_subnet<S: AsRef<str>>(
        &self,
        name: &str,
        cidr: &str,
        gateway: &str,
        exclude_ips: &[S],
    ) -> Result<()> {
        let existing = self.subnets.read().get(name).cloned();
        if let Some(existing) = existing {
            return existing.lock().update(cidr, gateway, exclude_ips);
        }
        let subnet = Subnet::new(name, cidr, gateway, exclude_ips)?;
        info!(subnet = name, cidr, "subnet registered");
        self.subnets
            .write()
            .insert(name.to_string(), Arc::new(Mutex::new(subnet)));
        Ok(())
    }

    /// Drops a subnet and every allocation in it. Unknown names are a
    /// no-op.
    pub fn delete_subnet(&self, name: &str) {
        if self.subnets.write().remove(name).is_some() {
            info!(subnet = name, "subnet deleted");
        }
    }

    /// Names of all registered subnets.
    #[must_use]
    pub fn subnet_names(&self) -> Vec<String> {
        self.subnets.read().keys().cloned().collect()
    }

    /// Grants `owner` an address in every family `subnet` is
    /// configured with. Idempotent per owner.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`] for unknown subnets, plus the
    /// allocation errors of [`Subnet::allocate`].
    pub fn allocate(
        &self,
        subnet: &str,
        owner: &str,
        request: &AllocationRequest,
    ) -> Result<AllocationReply> {
        self.subnet(subnet)?.lock().allocate(owner, request)
    }

    /// Releases whatever `owner` holds. With a subnet name only that
    /// subnet is touched; without one every subnet is swept, covering
    /// deletion events that no longer carry a subnet annotation.
    /// Unknown owners and subnets are a successful no-op.
    pub fn release(&self, subnet: Option<&str>, owner: &str) {
        let targets: Vec<Arc<Mutex<Subnet>>> = match subnet {
            Some(name) => self.subnets.read().get(name).cloned().into_iter().collect(),
            None => self.subnets.read().values().cloned().collect(),
        };
        for target in targets {
            target.lock().release(owner);
        }
    }

    /// Whether any registered subnet's CIDR covers `ip`.
    #[must_use]
    pub fn contains_address(&self, ip: Ip) -> bool {
        let subnets: Vec<Arc<Mutex<Subnet>>> = self.subnets.read().values().cloned().collect();
        subnets.iter().any(|s| s.lock().contains(ip))
    }

    /// Every address `owner` currently holds, swept across all
    /// subnets. Lets a controller recover a pod's addresses from the
    /// owner key alone.
    #[must_use]
    pub fn owner_addresses(&self, owner: &str) -> Vec<Ip> {
        let subnets: Vec<Arc<Mutex<Subnet>>> = self.subnets.read().values().cloned().collect();
        subnets
            .iter()
            .flat_map(|s| s.lock().owner_addresses(owner))
            .collect()
    }

    /// Owner other than `owner` currently holding `ip` in `subnet`,
    /// if any.
    #[must_use]
    pub fn owned_by_other(&self, subnet: &str, ip: Ip, owner: &str) -> Option<String> {
        self.subnet(subnet)
            .ok()
            .and_then(|s| s.lock().owned_by_other(ip, owner))
    }

    /// Creates or replaces a pool in `subnet`.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`], parse failures of the pool's
    /// address entries, and [`IpamError::PoolConflict`] on overlap
    /// with a sibling pool.
    pub fn add_or_update_pool<S: AsRef<str>>(
        &self,
        subnet: &str,
        name: &str,
        ips: &[S],
        namespaces: Vec<String>,
    ) -> Result<()> {
        self.subnet(subnet)?
            .lock()
            .add_or_update_pool(name, ips, namespaces)
    }

    /// Removes a pool from `subnet`. Unknown pools and subnets are a
    /// no-op.
    pub fn remove_pool(&self, subnet: &str, name: &str) {
        if let Ok(target) = self.subnet(subnet) {
            target.lock().remove_pool(name);
        }
    }

    /// Snapshot of `subnet`'s per-family usage counters.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`].
    pub fn subnet_usage(&self, subnet: &str) -> Result<SubnetUsage> {
        Ok(self.subnet(subnet)?.lock().usage())
    }

    /// Snapshot of one pool's slice of its subnet.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`] and [`IpamError::PoolNotFound`].
    pub fn pool_usage(&self, subnet: &str, pool: &str) -> Result<PoolUsage> {
        self.subnet(subnet)?
            .lock()
            .pool_usage(pool)
            .ok_or_else(|| IpamError::PoolNotFound {
                subnet: subnet.to_string(),
                pool: pool.to_string(),
            })
    }

    /// Registers or updates a subnet straight from its CRD spec.
    ///
    /// # Errors
    /// Same as [`Ipam::add_or_update_subnet`].
    pub fn apply_subnet(&self, resource: &crds::Subnet) -> Result<()> {
        let name = resource
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| IpamError::SubnetNotFound(String::new()))?;
        self.add_or_update_subnet(
            name,
            &resource.spec.cidr_block,
            resource.spec.gateway.as_deref().unwrap_or(""),
            &resource.spec.exclude_ips,
        )
    }

    /// Creates or updates a pool straight from its CRD spec.
    ///
    /// # Errors
    /// Same as [`Ipam::add_or_update_pool`].
    pub fn apply_pool(&self, resource: &crds::IPPool) -> Result<()> {
        let name = resource.metadata.name.as_deref().ok_or_else(|| {
            IpamError::PoolNotFound {
                subnet: resource.spec.subnet.clone(),
                pool: String::new(),
            }
        })?;
        self.add_or_update_pool(
            &resource.spec.subnet,
            name,
            &resource.spec.ips,
            resource.spec.namespaces.clone(),
        )
    }

    /// Renders `subnet`'s usage as a CRD status.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`].
    pub fn subnet_status(&self, subnet: &str) -> Result<crds::SubnetStatus> {
        Ok(self.subnet_usage(subnet)?.to_status())
    }

    /// Renders one pool's usage as a CRD status.
    ///
    /// # Errors
    /// [`IpamError::SubnetNotFound`] and [`IpamError::PoolNotFound`].
    pub fn pool_status(&self, subnet: &str, pool: &str) -> Result<crds::IPPoolStatus> {
        Ok(self.pool_usage(subnet, pool)?.to_status())
    }
}
