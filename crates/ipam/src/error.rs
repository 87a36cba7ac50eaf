//! IPAM engine error types.
//!
//! All errors are returned synchronously to the caller; the engine
//! never retries internally. Releasing an unknown owner is not an
//! error at all but a successful no-op, so finalizer-driven retries
//! stay idempotent.

use thiserror::Error;

use crate::ip::{Family, Ip};

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, IpamError>;

/// Errors that can occur in the IPAM engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpamError {
    /// A CIDR block failed to parse or had an unsupported shape.
    #[error("invalid CIDR {0:?}")]
    InvalidCidr(String),

    /// An address literal failed to parse.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// A `lo..hi` range entry was malformed or reversed.
    #[error("invalid range {0:?}")]
    InvalidRange(String),

    /// Two addresses of different families were compared or combined.
    #[error("address family mismatch: {left} vs {right}")]
    FamilyMismatch {
        /// Family of the left-hand operand.
        left: Family,
        /// Family of the right-hand operand.
        right: Family,
    },

    /// A requested address lies outside the subnet CIDR.
    #[error("address {address} is out of range of subnet {subnet}")]
    OutOfRange {
        /// Subnet the request was made against.
        subnet: String,
        /// The offending address.
        address: Ip,
    },

    /// A requested address falls in the subnet's excluded space.
    #[error("address {address} is excluded in subnet {subnet}")]
    Excluded {
        /// Subnet the request was made against.
        subnet: String,
        /// The offending address.
        address: Ip,
    },

    /// A requested address is already held by a different owner.
    #[error("address {address} in subnet {subnet} is already allocated to {owner}")]
    Conflict {
        /// Subnet the request was made against.
        subnet: String,
        /// The contested address.
        address: Ip,
        /// Owner key currently holding the address.
        owner: String,
    },

    /// The subnet has no free address left in the requested family.
    #[error("no available {family} address in subnet {subnet}")]
    Exhausted {
        /// Subnet that ran dry.
        subnet: String,
        /// Family that ran dry.
        family: Family,
    },

    /// Every address of a pool is already in use. A pool can be full
    /// while the subnet still has free space elsewhere.
    #[error("no available {family} address in ippool {pool}")]
    PoolExhausted {
        /// Pool that ran dry.
        pool: String,
        /// Family that ran dry.
        family: Family,
    },

    /// The owner's namespace is not in the pool's allow-list.
    #[error("namespace {namespace} is not allowed to use ippool {pool}")]
    PoolMismatch {
        /// Pool the request named.
        pool: String,
        /// Namespace of the requesting owner.
        namespace: String,
    },

    /// A pool definition overlaps the address set of another pool.
    #[error("ippool {pool} has conflicting addresses with ippool {other}: {overlap}")]
    PoolConflict {
        /// Pool being created or updated.
        pool: String,
        /// Existing pool it collides with.
        other: String,
        /// Serialized overlap, for the operator.
        overlap: String,
    },

    /// An allocation request named a pool the subnet does not have.
    #[error("ippool {pool} does not exist in subnet {subnet}")]
    PoolNotFound {
        /// Subnet the request was made against.
        subnet: String,
        /// The missing pool name.
        pool: String,
    },

    /// An operation named a subnet the registry does not have.
    #[error("subnet {0} does not exist")]
    SubnetNotFound(String),

    /// The available/using/excluded sets no longer partition the CIDR.
    /// This signals a bug in the range algebra; the operation that
    /// detected it is aborted and no further allocation decision made.
    #[error("invariant violation in subnet {subnet}: {detail}")]
    InvariantViolation {
        /// Subnet whose state is broken.
        subnet: String,
        /// Human-readable description of what no longer holds.
        detail: String,
    },
}
