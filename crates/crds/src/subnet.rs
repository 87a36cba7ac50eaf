//! Subnet CRD
//!
//! Defines a routable address block managed by the IPAM engine. Dual
//! stack subnets carry both CIDRs comma-joined in `cidrBlock`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubesdn.io",
    version = "v1",
    kind = "Subnet",
    status = "SubnetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// CIDR of the subnet; a dual-stack subnet joins its IPv4 and
    /// IPv6 blocks with a comma, e.g. "10.16.0.0/16,fd00::/64"
    pub cidr_block: String,

    /// Gateway address(es), comma-joined for dual stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Addresses never handed out: single IPs or "lo..hi" ranges
    #[serde(default)]
    pub exclude_ips: Vec<String>,

    /// Namespaces bound to this subnet; empty means cluster default
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// Observed allocation state of a subnet.
///
/// The field names are part of the published API and do not follow one
/// casing convention, hence the explicit renames.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct SubnetStatus {
    /// Free IPv4 address count
    #[serde(rename = "v4availableIPs")]
    pub v4_available_ips: f64,

    /// Free IPv4 addresses, canonical range form
    #[serde(rename = "v4availableIPrange")]
    pub v4_available_ip_range: String,

    /// Allocated IPv4 address count
    #[serde(rename = "v4usingIPs")]
    pub v4_using_ips: f64,

    /// Allocated IPv4 addresses, canonical range form
    #[serde(rename = "v4usingIPrange")]
    pub v4_using_ip_range: String,

    /// Free IPv6 address count
    #[serde(rename = "v6availableIPs")]
    pub v6_available_ips: f64,

    /// Free IPv6 addresses, canonical range form
    #[serde(rename = "v6availableIPrange")]
    pub v6_available_ip_range: String,

    /// Allocated IPv6 address count
    #[serde(rename = "v6usingIPs")]
    pub v6_using_ips: f64,

    /// Allocated IPv6 addresses, canonical range form
    #[serde(rename = "v6usingIPrange")]
    pub v6_using_ip_range: String,

    /// Last reconciliation timestamp
    #[serde(
        rename = "lastReconciled",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_published_field_names() {
        let status = SubnetStatus {
            v4_available_ips: 65533.0,
            v4_available_ip_range: "12.10.0.2..12.10.255.254".to_string(),
            v4_using_ips: 0.0,
            v4_using_ip_range: String::new(),
            ..SubnetStatus::default()
        };
        let value = serde_json::to_value(&status).expect("serialize");
        assert_eq!(value["v4availableIPs"], 65533.0);
        assert_eq!(value["v4availableIPrange"], "12.10.0.2..12.10.255.254");
        assert_eq!(value["v4usingIPs"], 0.0);
        assert_eq!(value["v6availableIPs"], 0.0);
        assert!(value.get("lastReconciled").is_none());
    }

    #[test]
    fn spec_round_trips_camel_case() {
        let json = serde_json::json!({
            "cidrBlock": "10.16.0.0/16,fd00::/64",
            "gateway": "10.16.0.1,fd00::1",
            "excludeIps": ["10.16.0.10..10.16.0.20"],
        });
        let spec: SubnetSpec = serde_json::from_value(json).expect("deserialize");
        assert_eq!(spec.cidr_block, "10.16.0.0/16,fd00::/64");
        assert_eq!(spec.exclude_ips, vec!["10.16.0.10..10.16.0.20"]);
        assert!(spec.namespaces.is_empty());
    }
}
