use std::net::{Ipv4Addr, Ipv6Addr};

use domain::conntrack::entity::{
    CT_ZONE, CT_ZONE_V6, DatapathType, GatewayConfig, NodeConfig, ServiceCidrs,
};
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, parse_cidr_family};
use crate::constants::{DEFAULT_MAX_PATH, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TABLE_PATH};

/// Addresses of this Node's gateway interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    #[serde(default)]
    pub gateway_ipv4: Option<Ipv4Addr>,

    #[serde(default)]
    pub gateway_ipv6: Option<Ipv6Addr>,
}

impl NodeSection {
    pub fn to_domain(&self) -> NodeConfig {
        NodeConfig {
            gateway: GatewayConfig {
                ipv4: self.gateway_ipv4,
                ipv6: self.gateway_ipv6,
            },
        }
    }
}

/// Cluster Service address ranges, one per family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceCidrSection {
    #[serde(default)]
    pub ipv4: Option<String>,

    #[serde(default)]
    pub ipv6: Option<String>,
}

impl ServiceCidrSection {
    /// Parse both prefixes, checking each against the family of its key.
    pub fn to_domain(&self) -> Result<ServiceCidrs, ConfigError> {
        let ipv4 = self
            .ipv4
            .as_deref()
            .map(|s| parse_cidr_family("service_cidr.ipv4", s, false))
            .transpose()?;
        let ipv6 = self
            .ipv6
            .as_deref()
            .map(|s| parse_cidr_family("service_cidr.ipv6", s, true))
            .transpose()?;
        ServiceCidrs::new(ipv4, ipv6).map_err(|e| ConfigError::Validation {
            field: "service_cidr".to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnTrackConfig {
    #[serde(default)]
    pub datapath: DatapathType,

    /// An in-process L4 proxy performs Service NAT; kernel NAT leaves
    /// ClusterIP-keyed duplicates in the table.
    #[serde(default)]
    pub proxy_enabled: bool,

    /// Protocol names to export. Unknown names are ignored with a warning
    /// when the dumper is built. Empty means every protocol.
    #[serde(default)]
    pub protocol_filter: Vec<String>,

    /// Zones to poll. Defaults to the IPv4 Pod zone, plus the IPv6 one when
    /// the Node has an IPv6 gateway.
    #[serde(default)]
    pub zones: Option<Vec<u16>>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_table_path")]
    pub table_path: String,

    #[serde(default = "default_max_path")]
    pub max_path: String,
}

impl Default for ConnTrackConfig {
    fn default() -> Self {
        Self {
            datapath: DatapathType::default(),
            proxy_enabled: false,
            protocol_filter: Vec::new(),
            zones: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            table_path: DEFAULT_TABLE_PATH.to_string(),
            max_path: DEFAULT_MAX_PATH.to_string(),
        }
    }
}

impl ConnTrackConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "conntrack.poll_interval_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if let Some(zones) = &self.zones {
            if zones.is_empty() {
                return Err(ConfigError::Validation {
                    field: "conntrack.zones".to_string(),
                    message: "at least one zone is required".to_string(),
                });
            }
            for (i, zone) in zones.iter().enumerate() {
                if zones[..i].contains(zone) {
                    return Err(ConfigError::Validation {
                        field: "conntrack.zones".to_string(),
                        message: format!("duplicate zone {zone}"),
                    });
                }
            }
        }

        for (field, path) in [
            ("conntrack.table_path", &self.table_path),
            ("conntrack.max_path", &self.max_path),
        ] {
            if path.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Zones to poll, resolving the default against the Node's gateways.
    pub fn effective_zones(&self, node: &NodeSection) -> Vec<u16> {
        match &self.zones {
            Some(zones) => zones.clone(),
            None if node.gateway_ipv6.is_some() => vec![CT_ZONE, CT_ZONE_V6],
            None => vec![CT_ZONE],
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_table_path() -> String {
    DEFAULT_TABLE_PATH.to_string()
}
fn default_max_path() -> String {
    DEFAULT_MAX_PATH.to_string()
}
