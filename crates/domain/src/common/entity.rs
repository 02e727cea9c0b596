use serde::{Deserialize, Serialize};

/// IP protocol carried by a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
    IcmpV6,
    Sctp,
    Other(u8),
}

impl Protocol {
    /// Convert to the IANA protocol number.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::IcmpV6 => 58,
            Self::Sctp => 132,
            Self::Other(n) => n,
        }
    }

    /// Create from an IANA protocol number.
    pub fn from_u8(n: u8) -> Self {
        match n {
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            58 => Self::IcmpV6,
            132 => Self::Sctp,
            other => Self::Other(other),
        }
    }

    /// Lower-case protocol name, as printed by the kernel conntrack table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::IcmpV6 => "icmpv6",
            Self::Sctp => "sctp",
            Self::Other(_) => "unknown",
        }
    }

    /// Resolve a service protocol name (`TCP`, `UDP`, `SCTP`), ignoring case.
    ///
    /// Only the protocols a Kubernetes Service can expose are accepted.
    pub fn from_service_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            "SCTP" => Some(Self::Sctp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(n) => write!(f, "proto-{n}"),
            other => f.write_str(other.as_str()),
        }
    }
}
