use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid prefix length {prefix_len} for {family}")]
    InvalidPrefix { prefix_len: u8, family: &'static str },

    #[error("invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },
}

/// An IPv4 or IPv6 network prefix.
///
/// The stored address is not required to be the network address: host bits
/// are ignored by [`IpNetwork::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpNetwork {
    /// Prefix 0-32.
    V4 { addr: Ipv4Addr, prefix_len: u8 },
    /// Prefix 0-128.
    V6 { addr: Ipv6Addr, prefix_len: u8 },
}

impl IpNetwork {
    pub fn v4(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        let net = Self::V4 { addr, prefix_len };
        net.validate()?;
        Ok(net)
    }

    pub fn v6(addr: Ipv6Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        let net = Self::V6 { addr, prefix_len };
        net.validate()?;
        Ok(net)
    }

    /// Check whether `ip` falls within this network.
    ///
    /// An address of the other family never matches: an IPv4 network does
    /// not contain IPv4-mapped IPv6 addresses and vice versa.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (*self, ip) {
            (Self::V4 { addr, prefix_len }, IpAddr::V4(ip)) => {
                cidr_match_v4(u32::from(addr), prefix_len, u32::from(ip))
            }
            (Self::V6 { addr, prefix_len }, IpAddr::V6(ip)) => {
                cidr_match_v6(u128::from(addr), prefix_len, u128::from(ip))
            }
            _ => false,
        }
    }

    /// Returns `true` if this is an IPv6 network.
    pub fn is_v6(&self) -> bool {
        matches!(self, Self::V6 { .. })
    }

    pub fn prefix_len(&self) -> u8 {
        match *self {
            Self::V4 { prefix_len, .. } | Self::V6 { prefix_len, .. } => prefix_len,
        }
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        match *self {
            Self::V4 { prefix_len, .. } if prefix_len > 32 => Err(NetworkError::InvalidPrefix {
                prefix_len,
                family: "IPv4",
            }),
            Self::V6 { prefix_len, .. } if prefix_len > 128 => Err(NetworkError::InvalidPrefix {
                prefix_len,
                family: "IPv6",
            }),
            _ => Ok(()),
        }
    }
}

fn cidr_match_v4(net: u32, prefix_len: u8, ip: u32) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - u32::from(prefix_len.min(32)));
    (net & mask) == (ip & mask)
}

fn cidr_match_v6(net: u128, prefix_len: u8, ip: u128) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask = u128::MAX << (128 - u32::from(prefix_len.min(128)));
    (net & mask) == (ip & mask)
}

impl FromStr for IpNetwork {
    type Err = NetworkError;

    /// Parse `"10.96.0.0/12"`, `"fd00::/108"`, or a bare address (host prefix).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| NetworkError::InvalidCidr {
            value: s.to_string(),
            reason,
        };

        let (ip_str, prefix) = match s.split_once('/') {
            Some((ip, prefix)) => {
                let len = prefix
                    .parse::<u8>()
                    .map_err(|_| invalid(format!("invalid prefix length: '{prefix}'")))?;
                (ip, Some(len))
            }
            None => (s, None),
        };

        let addr: IpAddr = ip_str
            .parse()
            .map_err(|e| invalid(format!("invalid address: {e}")))?;

        let net = match addr {
            IpAddr::V4(addr) => Self::V4 {
                addr,
                prefix_len: prefix.unwrap_or(32),
            },
            IpAddr::V6(addr) => Self::V6 {
                addr,
                prefix_len: prefix.unwrap_or(128),
            },
        };
        net.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(net)
    }
}

impl std::fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 { addr, prefix_len } => write!(f, "{addr}/{prefix_len}"),
            Self::V6 { addr, prefix_len } => write!(f, "{addr}/{prefix_len}"),
        }
    }
}
