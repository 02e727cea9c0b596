use domain::common::error::DomainError;
use domain::conntrack::entity::{DatapathType, NodeConfig, ServiceCidrs};
use domain::conntrack::error::ConnTrackError;
use domain::conntrack::filter::{ConnectionFilter, DropReason};
use domain::conntrack::protocol::{ProtocolFilter, validate_protocol_filter};
use ports::primary::conntrack_dumper::{ConnTrackDumper, FlowDump};
use ports::secondary::conntrack_table_port::ConnTrackTablePort;
use tracing::{debug, info, trace, warn};

/// Inputs for [`initialize_conntrack_dumper`], validated at startup.
#[derive(Debug, Clone, Default)]
pub struct DumperSettings {
    pub node: NodeConfig,
    pub service_cidrs: ServiceCidrs,
    pub datapath: DatapathType,
    /// An in-process proxy performs Service NAT instead of the kernel.
    pub proxy_enabled: bool,
    /// Protocol names as configured; unknown names are ignored with a warning.
    pub protocol_filter: Vec<String>,
}

/// Build the dumper for the configured datapath.
///
/// `table` is the kernel connection table, used by the `system` datapath.
/// Any other datapath has no dumper and yields
/// [`ConnTrackError::UnsupportedDatapath`], which callers treat as fatal.
pub fn initialize_conntrack_dumper(
    settings: &DumperSettings,
    table: Box<dyn ConnTrackTablePort>,
) -> Result<Box<dyn ConnTrackDumper>, ConnTrackError> {
    let protocol_filter = resolve_protocol_filter(&settings.protocol_filter);

    match settings.datapath {
        DatapathType::System => {
            let filter = ConnectionFilter::new(
                &settings.node,
                settings.service_cidrs,
                settings.proxy_enabled,
                protocol_filter,
            );
            info!(
                datapath = %settings.datapath,
                proxy_enabled = settings.proxy_enabled,
                protocols = ?filter.protocol_filter().protocols(),
                "conntrack dumper initialized"
            );
            Ok(Box::new(SystemConnTrackDumper::new(table, filter)))
        }
        DatapathType::Netdev => Err(ConnTrackError::UnsupportedDatapath {
            datapath: settings.datapath,
        }),
    }
}

/// Validate protocol names, logging the unsupported ones once.
fn resolve_protocol_filter(names: &[String]) -> ProtocolFilter {
    let validation = validate_protocol_filter(names);
    if validation.has_unsupported() {
        warn!(
            protocols = %validation.unsupported.join(","),
            "unsupported protocol(s) in conntrack protocol filter, ignoring them"
        );
    }
    validation.filter
}

/// Dumper for the kernel datapath: queries the kernel table and runs the
/// result through the filter chain.
pub struct SystemConnTrackDumper {
    table: Box<dyn ConnTrackTablePort>,
    filter: ConnectionFilter,
}

impl SystemConnTrackDumper {
    pub fn new(table: Box<dyn ConnTrackTablePort>, filter: ConnectionFilter) -> Self {
        Self { table, filter }
    }
}

impl ConnTrackDumper for SystemConnTrackDumper {
    fn dump_flows(&self, zone: u16) -> Result<FlowDump, DomainError> {
        let mut connections = self.table.dump_zone(zone).map_err(|e| {
            DomainError::from(ConnTrackError::QueryFailed {
                zone,
                reason: e.to_string(),
            })
        })?;

        if tracing::enabled!(tracing::Level::TRACE) {
            for conn in &connections {
                if self.filter.verdict(conn, zone) == Some(DropReason::ServiceCidr) {
                    trace!(flow = %conn.flow_key, zone, "dropping ClusterIP-keyed duplicate of a Service flow");
                }
            }
        }

        let stats = self.filter.apply(&mut connections, zone);
        debug!(
            zone,
            total = stats.total,
            kept = stats.kept,
            "conntrack flows dumped"
        );
        Ok(FlowDump { connections, stats })
    }

    fn max_connections(&self) -> Result<u64, DomainError> {
        self.table.max_connections()
    }
}
