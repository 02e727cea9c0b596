use domain::common::error::DomainError;
use domain::conntrack::entity::Connection;
use domain::conntrack::filter::FilterStats;

/// Filtered connections of one zone from a single table snapshot.
#[derive(Debug, Clone, Default)]
pub struct FlowDump {
    pub connections: Vec<Connection>,
    pub stats: FilterStats,
}

/// Primary port: produce the exportable connection set of a zone.
///
/// One implementation exists per supported datapath; it is chosen once at
/// startup. A failed table query is an `Err`, never an empty dump.
pub trait ConnTrackDumper: Send + Sync {
    /// Dump the table for `zone` and run it through the filter chain.
    fn dump_flows(&self, zone: u16) -> Result<FlowDump, DomainError>;

    /// Capacity of the underlying connection table.
    fn max_connections(&self) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conntrack_dumper_is_object_safe() {
        fn _check(dumper: &dyn ConnTrackDumper) {
            let _ = dumper.dump_flows(0);
            let _ = dumper.max_connections();
        }
    }

    #[test]
    fn default_dump_is_empty() {
        let dump = FlowDump::default();
        assert!(dump.connections.is_empty());
        assert_eq!(dump.stats.total, 0);
    }
}
