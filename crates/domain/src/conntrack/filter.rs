//! Filter chain turning a raw conntrack snapshot into exportable connections.
//!
//! Stages, in order:
//! 1. zone: keep only the zone being polled
//! 2. gateway: drop Node-internal traffic to or from the gateway
//! 3. Service CIDR: with kernel Service NAT, drop the ClusterIP-keyed duplicate
//! 4. protocol: apply the allow-list, if any
//!
//! Every stage only removes entries, so the chain is idempotent.

use serde::Serialize;

use super::entity::{Connection, GatewayConfig, NodeConfig, ServiceCidrs};
use super::protocol::ProtocolFilter;

/// Stage that removed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    Zone,
    Gateway,
    ServiceCidr,
    Protocol,
}

impl DropReason {
    pub const ALL: [Self; 4] = [Self::Zone, Self::Gateway, Self::ServiceCidr, Self::Protocol];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Gateway => "gateway",
            Self::ServiceCidr => "service_cidr",
            Self::Protocol => "protocol",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counters for one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub kept: usize,
    pub dropped_zone: usize,
    pub dropped_gateway: usize,
    pub dropped_service_cidr: usize,
    pub dropped_protocol: usize,
}

impl FilterStats {
    pub fn dropped(&self, reason: DropReason) -> usize {
        match reason {
            DropReason::Zone => self.dropped_zone,
            DropReason::Gateway => self.dropped_gateway,
            DropReason::ServiceCidr => self.dropped_service_cidr,
            DropReason::Protocol => self.dropped_protocol,
        }
    }

    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::Zone => self.dropped_zone += 1,
            DropReason::Gateway => self.dropped_gateway += 1,
            DropReason::ServiceCidr => self.dropped_service_cidr += 1,
            DropReason::Protocol => self.dropped_protocol += 1,
        }
    }
}

/// Read-only filter configuration, built once and applied to every poll.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFilter {
    gateway: GatewayConfig,
    service_cidrs: ServiceCidrs,
    proxy_enabled: bool,
    protocol_filter: ProtocolFilter,
}

impl ConnectionFilter {
    /// `proxy_enabled` is true when an in-process proxy performs Service NAT,
    /// in which case the kernel never creates ClusterIP-keyed duplicates.
    pub fn new(
        node: &NodeConfig,
        service_cidrs: ServiceCidrs,
        proxy_enabled: bool,
        protocol_filter: ProtocolFilter,
    ) -> Self {
        Self {
            gateway: node.gateway,
            service_cidrs,
            proxy_enabled,
            protocol_filter,
        }
    }

    pub fn protocol_filter(&self) -> &ProtocolFilter {
        &self.protocol_filter
    }

    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled
    }

    /// Return the first stage that rejects `conn`, or `None` if it is kept.
    pub fn verdict(&self, conn: &Connection, zone: u16) -> Option<DropReason> {
        if conn.zone != zone {
            return Some(DropReason::Zone);
        }

        let src = conn.flow_key.src_addr;
        let dst = conn.flow_key.dst_addr;

        // Pod-to-Pod, Pod-to-Service and Pod-to-External flows only.
        if self.gateway.matches(src) || self.gateway.matches(dst) {
            return Some(DropReason::Gateway);
        }

        // With kernel Service NAT every Pod-to-Service flow appears twice with
        // identical counters: once towards the ClusterIP and once towards the
        // resolved endpoint. Keep the endpoint one.
        if !self.proxy_enabled && self.service_cidrs.contains(dst) {
            return Some(DropReason::ServiceCidr);
        }

        if !self.protocol_filter.allows(conn.flow_key.protocol) {
            return Some(DropReason::Protocol);
        }

        None
    }

    /// Filter `conns` in place for `zone`, preserving the relative order of
    /// the survivors.
    pub fn apply(&self, conns: &mut Vec<Connection>, zone: u16) -> FilterStats {
        let mut stats = FilterStats {
            total: conns.len(),
            ..FilterStats::default()
        };
        conns.retain(|conn| match self.verdict(conn, zone) {
            Some(reason) => {
                stats.record(reason);
                false
            }
            None => true,
        });
        stats.kept = conns.len();
        stats
    }
}

/// One-shot form of [`ConnectionFilter::apply`].
///
/// Takes the snapshot by value so the in-place compaction can never be
/// observed through another handle.
pub fn filter_connections(
    mut conns: Vec<Connection>,
    node: &NodeConfig,
    service_cidrs: &ServiceCidrs,
    zone_filter: u16,
    proxy_enabled: bool,
    protocol_filter: &ProtocolFilter,
) -> Vec<Connection> {
    let filter = ConnectionFilter::new(node, *service_cidrs, proxy_enabled, protocol_filter.clone());
    filter.apply(&mut conns, zone_filter);
    conns
}
