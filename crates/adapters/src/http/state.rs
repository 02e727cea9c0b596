use std::sync::Arc;
use std::time::Instant;

use application::conntrack_service_impl::ConnTrackPollService;
use infrastructure::metrics::AgentMetrics;
use tokio::sync::RwLock;

/// Shared application state for the HTTP server.
///
/// Passed to Axum handlers via `State(Arc<AppState>)`.
pub struct AppState {
    pub metrics: Arc<AgentMetrics>,
    pub conntrack_service: Arc<RwLock<ConnTrackPollService>>,
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        metrics: Arc<AgentMetrics>,
        conntrack_service: Arc<RwLock<ConnTrackPollService>>,
    ) -> Self {
        Self {
            metrics,
            conntrack_service,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::{IpAddr, Ipv4Addr};

    use application::conntrack_dumper_impl::SystemConnTrackDumper;
    use domain::conntrack::entity::{CT_ZONE, CT_ZONE_V6, Connection, NodeConfig, Tuple};
    use domain::conntrack::filter::ConnectionFilter;
    use ports::test_utils::{NoopMetrics, StaticConnTrackTable};

    use super::*;

    pub(crate) fn connection(last_octet: u8) -> Connection {
        Connection {
            flow_key: Tuple {
                src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
                dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 1, last_octet)),
                src_port: 40000,
                dst_port: 443,
                protocol: 6,
            },
            zone: CT_ZONE,
            is_present: true,
            original_dst_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 96, 0, 10))),
            original_dst_port: Some(80),
            original_packets: 3,
            reverse_packets: 2,
            ..Connection::default()
        }
    }

    /// State backed by a canned table holding `count` connections in the
    /// IPv4 Pod zone, polling both Pod zones.
    pub(crate) fn state_with(count: u8, table_fails: bool) -> Arc<AppState> {
        let table = if table_fails {
            StaticConnTrackTable::failing("table unreadable")
        } else {
            StaticConnTrackTable::new((1..=count).map(connection).collect())
        };
        let dumper = SystemConnTrackDumper::new(
            Box::new(table),
            ConnectionFilter::new(
                &NodeConfig::default(),
                Default::default(),
                true,
                Default::default(),
            ),
        );
        let service = ConnTrackPollService::new(
            Arc::new(dumper),
            Arc::new(NoopMetrics),
            vec![CT_ZONE, CT_ZONE_V6],
        );
        Arc::new(AppState::new(
            Arc::new(AgentMetrics::new()),
            Arc::new(RwLock::new(service)),
        ))
    }
}
