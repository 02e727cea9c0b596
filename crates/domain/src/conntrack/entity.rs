use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::error::ConnTrackError;
use crate::common::network::IpNetwork;

/// Conntrack zone used for IPv4 Pod traffic.
pub const CT_ZONE: u16 = 0xfff0;

/// Conntrack zone used for IPv6 Pod traffic.
pub const CT_ZONE_V6: u16 = 0xffe6;

/// Connection status bits, as reported by the kernel (`enum ip_conntrack_status`).
pub mod status {
    pub const EXPECTED: u32 = 1 << 0;
    pub const SEEN_REPLY: u32 = 1 << 1;
    pub const ASSURED: u32 = 1 << 2;
    pub const CONFIRMED: u32 = 1 << 3;
    pub const SRC_NAT: u32 = 1 << 4;
    pub const DST_NAT: u32 = 1 << 5;
    pub const SEQ_ADJUST: u32 = 1 << 6;
    pub const SRC_NAT_DONE: u32 = 1 << 7;
    pub const DST_NAT_DONE: u32 = 1 << 8;
    pub const DYING: u32 = 1 << 9;
    pub const FIXED_TIMEOUT: u32 = 1 << 10;
    pub const TEMPLATE: u32 = 1 << 11;
    pub const UNTRACKED: u32 = 1 << 12;
    pub const OFFLOAD: u32 = 1 << 14;
}

/// TCP state of a tracked connection, as named by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcpState {
    SynSent,
    SynRecv,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
    Close,
    SynSent2,
}

impl TcpState {
    /// Parse the upper-case state name used in the kernel's text dump.
    pub fn from_kernel_name(name: &str) -> Option<Self> {
        match name {
            "SYN_SENT" => Some(Self::SynSent),
            "SYN_RECV" => Some(Self::SynRecv),
            "ESTABLISHED" => Some(Self::Established),
            "FIN_WAIT" => Some(Self::FinWait),
            "CLOSE_WAIT" => Some(Self::CloseWait),
            "LAST_ACK" => Some(Self::LastAck),
            "TIME_WAIT" => Some(Self::TimeWait),
            "CLOSE" => Some(Self::Close),
            "SYN_SENT2" => Some(Self::SynSent2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::SynSent2 => "SYN_SENT2",
        }
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow identity. Direction is significant: no canonicalization is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl Default for Tuple {
    fn default() -> Self {
        Self {
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
        }
    }
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port, self.protocol
        )
    }
}

/// One tracked connection from a single table snapshot.
///
/// `flow_key` is the post-NAT tuple: its destination is the resolved backend.
/// `original_dst_addr`/`original_dst_port` hold the pre-NAT destination and
/// are only set when a destination rewrite happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub flow_key: Tuple,
    pub zone: u16,
    /// Remaining lifetime in seconds.
    pub timeout: u32,
    pub start_time: Option<SystemTime>,
    pub stop_time: Option<SystemTime>,
    pub is_present: bool,
    pub status_flag: u32,
    pub mark: u32,
    pub tcp_state: Option<TcpState>,
    pub original_dst_addr: Option<IpAddr>,
    pub original_dst_port: Option<u16>,
    pub original_packets: u64,
    pub original_bytes: u64,
    pub reverse_packets: u64,
    pub reverse_bytes: u64,
}

impl Connection {
    pub fn is_ipv6(&self) -> bool {
        self.flow_key.src_addr.is_ipv6()
    }

    pub fn has_status(&self, flag: u32) -> bool {
        self.status_flag & flag == flag
    }

    /// Whether the destination was rewritten before reaching the backend.
    pub fn is_dst_nat(&self) -> bool {
        self.original_dst_addr.is_some() || self.has_status(status::DST_NAT)
    }

    /// Destination as dialed by the client (pre-NAT when a rewrite happened).
    pub fn original_destination(&self) -> (IpAddr, u16) {
        (
            self.original_dst_addr.unwrap_or(self.flow_key.dst_addr),
            self.original_dst_port.unwrap_or(self.flow_key.dst_port),
        )
    }

    pub fn total_packets(&self) -> u64 {
        self.original_packets.saturating_add(self.reverse_packets)
    }

    pub fn total_bytes(&self) -> u64 {
        self.original_bytes.saturating_add(self.reverse_bytes)
    }
}

/// Gateway interface addresses of this Node. A family without a configured
/// address never matches any connection address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl GatewayConfig {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.ipv4 == Some(v4),
            IpAddr::V6(v6) => self.ipv6 == Some(v6),
        }
    }
}

/// Node topology consumed read-only by the filter chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub gateway: GatewayConfig,
}

/// Virtual Service address range, one prefix per address family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCidrs {
    ipv4: Option<IpNetwork>,
    ipv6: Option<IpNetwork>,
}

impl ServiceCidrs {
    /// Build from optional per-family prefixes, rejecting a prefix supplied
    /// for the wrong family.
    pub fn new(ipv4: Option<IpNetwork>, ipv6: Option<IpNetwork>) -> Result<Self, ConnTrackError> {
        if let Some(net) = ipv4
            && net.is_v6()
        {
            return Err(ConnTrackError::InvalidConfig {
                reason: format!("IPv4 Service CIDR {net} is an IPv6 prefix"),
            });
        }
        if let Some(net) = ipv6
            && !net.is_v6()
        {
            return Err(ConnTrackError::InvalidConfig {
                reason: format!("IPv6 Service CIDR {net} is an IPv4 prefix"),
            });
        }
        Ok(Self { ipv4, ipv6 })
    }

    pub fn ipv4(&self) -> Option<&IpNetwork> {
        self.ipv4.as_ref()
    }

    pub fn ipv6(&self) -> Option<&IpNetwork> {
        self.ipv6.as_ref()
    }

    /// The prefix configured for the family of `ip`, if any.
    pub fn for_family(&self, ip: IpAddr) -> Option<&IpNetwork> {
        match ip {
            IpAddr::V4(_) => self.ipv4.as_ref(),
            IpAddr::V6(_) => self.ipv6.as_ref(),
        }
    }

    /// Whether `ip` falls within the Service CIDR of its own family.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.for_family(ip).is_some_and(|net| net.contains(ip))
    }
}

/// Datapath flavor, selecting which table dumper can be built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatapathType {
    /// Kernel datapath: connections are tracked by the kernel conntrack table.
    #[default]
    System,
    /// Userspace switch datapath with its own connection tracker.
    Netdev,
}

impl DatapathType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Netdev => "netdev",
        }
    }
}

impl std::fmt::Display for DatapathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatapathType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "netdev" => Ok(Self::Netdev),
            _ => Err(format!("invalid datapath '{s}': expected system|netdev")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn tuple_equality_is_directional() {
        let fwd = Tuple {
            src_addr: ip("10.0.0.5"),
            dst_addr: ip("10.0.0.7"),
            src_port: 40000,
            dst_port: 80,
            protocol: 6,
        };
        let rev = Tuple {
            src_addr: fwd.dst_addr,
            dst_addr: fwd.src_addr,
            src_port: fwd.dst_port,
            dst_port: fwd.src_port,
            protocol: 6,
        };
        assert_ne!(fwd, rev);
        let copy = fwd;
        assert_eq!(fwd, copy);
    }

    #[test]
    fn tcp_state_kernel_names_roundtrip() {
        for name in [
            "SYN_SENT",
            "SYN_RECV",
            "ESTABLISHED",
            "FIN_WAIT",
            "CLOSE_WAIT",
            "LAST_ACK",
            "TIME_WAIT",
            "CLOSE",
            "SYN_SENT2",
        ] {
            let state = TcpState::from_kernel_name(name).unwrap();
            assert_eq!(state.as_str(), name);
        }
        assert_eq!(TcpState::from_kernel_name("NONE"), None);
    }

    #[test]
    fn original_destination_falls_back_to_flow_key() {
        let mut conn = Connection {
            flow_key: Tuple {
                dst_addr: ip("10.0.0.7"),
                dst_port: 8080,
                ..Tuple::default()
            },
            ..Connection::default()
        };
        assert_eq!(conn.original_destination(), (ip("10.0.0.7"), 8080));
        assert!(!conn.is_dst_nat());

        conn.original_dst_addr = Some(ip("10.96.0.10"));
        conn.original_dst_port = Some(80);
        assert_eq!(conn.original_destination(), (ip("10.96.0.10"), 80));
        assert!(conn.is_dst_nat());
    }

    #[test]
    fn status_flags() {
        let conn = Connection {
            status_flag: status::SEEN_REPLY | status::ASSURED | status::CONFIRMED,
            ..Connection::default()
        };
        assert!(conn.has_status(status::ASSURED));
        assert!(conn.has_status(status::SEEN_REPLY | status::CONFIRMED));
        assert!(!conn.has_status(status::DST_NAT));
    }

    #[test]
    fn counters_saturate() {
        let conn = Connection {
            original_bytes: u64::MAX,
            reverse_bytes: 1,
            original_packets: 3,
            reverse_packets: 4,
            ..Connection::default()
        };
        assert_eq!(conn.total_bytes(), u64::MAX);
        assert_eq!(conn.total_packets(), 7);
    }

    #[test]
    fn gateway_matches_per_family() {
        let gw = GatewayConfig {
            ipv4: Some(Ipv4Addr::new(10, 10, 0, 1)),
            ipv6: None,
        };
        assert!(gw.matches(ip("10.10.0.1")));
        assert!(!gw.matches(ip("10.10.0.2")));
        assert!(!gw.matches(ip("::")));
        assert!(!gw.matches(ip("::ffff:10.10.0.1")));
    }

    #[test]
    fn unconfigured_gateway_never_matches_unspecified() {
        let gw = GatewayConfig::default();
        assert!(!gw.matches(ip("0.0.0.0")));
        assert!(!gw.matches(ip("::")));
    }

    #[test]
    fn service_cidrs_reject_wrong_family() {
        let v4: IpNetwork = "10.96.0.0/12".parse().unwrap();
        let v6: IpNetwork = "fd00:10:96::/112".parse().unwrap();
        assert!(ServiceCidrs::new(Some(v6), None).is_err());
        assert!(ServiceCidrs::new(None, Some(v4)).is_err());
        assert!(ServiceCidrs::new(Some(v4), Some(v6)).is_ok());
    }

    #[test]
    fn service_cidrs_check_own_family_only() {
        let cidrs = ServiceCidrs::new(
            Some("0.0.0.0/0".parse().unwrap()),
            Some("fd00:10:96::/112".parse().unwrap()),
        )
        .unwrap();
        assert!(cidrs.contains(ip("192.0.2.1")));
        assert!(cidrs.contains(ip("fd00:10:96::1")));
        assert!(!cidrs.contains(ip("2001:db8::1")));
    }

    #[test]
    fn datapath_parse_and_display() {
        assert_eq!("system".parse::<DatapathType>(), Ok(DatapathType::System));
        assert_eq!("NetDev".parse::<DatapathType>(), Ok(DatapathType::Netdev));
        assert!("dpdk".parse::<DatapathType>().is_err());
        assert_eq!(DatapathType::Netdev.to_string(), "netdev");
    }

    #[test]
    fn default_zones() {
        assert_eq!(CT_ZONE, 65520);
        assert_eq!(CT_ZONE_V6, 65510);
    }
}
