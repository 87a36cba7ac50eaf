//! In-memory IP address management for kube-sdn.
//!
//! This crate is the allocation authority behind the subnet and IP pool
//! controllers: it assigns and reclaims IPv4/IPv6 addresses from subnet
//! CIDRs, tracks availability as normalized range sets, and projects
//! allocator state into the counter and range-string fields persisted
//! on `Subnet`/`IPPool` status objects.
//!
//! The engine is synchronous and purely in-memory. Each subnet is
//! guarded by its own mutex; the registry that maps subnet names to
//! allocators has a separate lock, so operations on independent subnets
//! never contend. Allocate and release are idempotent per owner key,
//! which lets reconciliation loops retry freely after a crash.

pub mod error;
pub mod ip;
pub mod pool;
pub mod range;
pub mod range_list;
pub mod registry;
pub mod status;
pub mod subnet;

#[cfg(test)]
mod range_list_test;

pub use error::{IpamError, Result};
pub use ip::{Family, Ip};
pub use pool::IpPool;
pub use range::IpRange;
pub use range_list::IpRangeList;
pub use registry::Ipam;
pub use status::{FamilyUsage, PoolUsage, SubnetUsage};
pub use subnet::{Allocation, AllocationReply, AllocationRequest, FamilyAllocator, Subnet};
