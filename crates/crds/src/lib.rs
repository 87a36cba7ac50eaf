//! kube-sdn CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the kube-sdn network
//! controllers.

pub mod ip_pool;
pub mod subnet;

pub use ip_pool::*;
pub use subnet::*;
