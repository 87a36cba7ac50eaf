//! IPPool CRD
//!
//! Defines a named slice of a subnet's addresses with an optional
//! namespace allow-list.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubesdn.io",
    version = "v1",
    kind = "IPPool",
    status = "IPPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolSpec {
    /// Subnet this pool draws from
    pub subnet: String,

    /// Pool addresses in declared order: single IPs, "lo..hi" ranges
    /// or CIDRs, of either family
    #[serde(default)]
    pub ips: Vec<String>,

    /// Namespaces allowed to allocate from this pool; empty means any
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// Observed allocation state of a pool, relative to its subnet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolStatus {
    /// Free IPv4 address count
    #[serde(rename = "v4AvailableIPs")]
    pub v4_available_ips: f64,

    /// Free IPv4 addresses, canonical range form
    #[serde(rename = "v4AvailableIPRange")]
    pub v4_available_ip_range: String,

    /// Allocated IPv4 address count
    #[serde(rename = "v4UsingIPs")]
    pub v4_using_ips: f64,

    /// Allocated IPv4 addresses, canonical range form
    #[serde(rename = "v4UsingIPRange")]
    pub v4_using_ip_range: String,

    /// Free IPv6 address count
    #[serde(rename = "v6AvailableIPs")]
    pub v6_available_ips: f64,

    /// Free IPv6 addresses, canonical range form
    #[serde(rename = "v6AvailableIPRange")]
    pub v6_available_ip_range: String,

    /// Allocated IPv6 address count
    #[serde(rename = "v6UsingIPs")]
    pub v6_using_ips: f64,

    /// Allocated IPv6 addresses, canonical range form
    #[serde(rename = "v6UsingIPRange")]
    pub v6_using_ip_range: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_published_field_names() {
        let status = IPPoolStatus {
            v4_available_ips: 3.0,
            v4_available_ip_range: "172.16.0.5..172.16.0.7".to_string(),
            v4_using_ips: 1.0,
            v4_using_ip_range: "172.16.0.4".to_string(),
            ..IPPoolStatus::default()
        };
        let value = serde_json::to_value(&status).expect("serialize");
        assert_eq!(value["v4AvailableIPs"], 3.0);
        assert_eq!(value["v4AvailableIPRange"], "172.16.0.5..172.16.0.7");
        assert_eq!(value["v4UsingIPs"], 1.0);
        assert_eq!(value["v6UsingIPRange"], "");
    }

    #[test]
    fn spec_defaults_apply() {
        let json = serde_json::json!({ "subnet": "ovn-default" });
        let spec: IPPoolSpec = serde_json::from_value(json).expect("deserialize");
        assert_eq!(spec.subnet, "ovn-default");
        assert!(spec.ips.is_empty());
        assert!(spec.namespaces.is_empty());
    }
}
