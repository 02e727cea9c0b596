use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use domain::common::error::DomainError;
use domain::conntrack::entity::Connection;
use domain::conntrack::filter::{DropReason, FilterStats};
use ports::primary::conntrack_dumper::{ConnTrackDumper, FlowDump};
use ports::secondary::metrics_port::MetricsPort;
use serde::Serialize;
use tracing::{debug, warn};

/// Last dump of one zone as seen by the poller.
#[derive(Debug, Clone, Default)]
pub struct ZoneSnapshot {
    pub connections: Vec<Connection>,
    pub stats: FilterStats,
    /// When the connections were dumped. `None` until the first success.
    pub polled_at: Option<SystemTime>,
    /// Set when the most recent poll failed; the connections are from an
    /// earlier, successful poll.
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Per-zone summary served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub zone: u16,
    pub connections: usize,
    pub stats: FilterStats,
    pub polled_at_unix_secs: Option<u64>,
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Application-level conntrack service.
///
/// Polls the dumper for every configured zone and keeps the last filtered
/// snapshot of each. Designed to be wrapped in `RwLock` for shared access
/// from HTTP handlers.
pub struct ConnTrackPollService {
    dumper: Arc<dyn ConnTrackDumper>,
    metrics: Arc<dyn MetricsPort>,
    zones: Vec<u16>,
    snapshots: BTreeMap<u16, ZoneSnapshot>,
    max_connections: Option<u64>,
}

impl ConnTrackPollService {
    pub fn new(
        dumper: Arc<dyn ConnTrackDumper>,
        metrics: Arc<dyn MetricsPort>,
        zones: Vec<u16>,
    ) -> Self {
        let snapshots = zones
            .iter()
            .map(|zone| (*zone, ZoneSnapshot::default()))
            .collect();
        Self {
            dumper,
            metrics,
            zones,
            snapshots,
            max_connections: None,
        }
    }

    /// Zones polled by this service, in configuration order.
    pub fn zones(&self) -> &[u16] {
        &self.zones
    }

    /// Shared handle to the dumper, for callers that run the blocking dump
    /// outside the service lock and hand the result to [`Self::record`].
    pub fn dumper(&self) -> Arc<dyn ConnTrackDumper> {
        Arc::clone(&self.dumper)
    }

    /// Dump every configured zone. Returns the number of zones that failed.
    pub fn poll_all(&mut self) -> usize {
        let zones = self.zones.clone();
        zones
            .into_iter()
            .filter(|zone| self.poll_zone(*zone).is_err())
            .count()
    }

    /// Dump a single zone and store the result.
    pub fn poll_zone(&mut self, zone: u16) -> Result<FilterStats, DomainError> {
        let result = self.dumper.dump_flows(zone);
        self.record(zone, result)
    }

    /// Store the outcome of a dump of `zone` and update metrics.
    ///
    /// A failed dump keeps the previous connections and marks them stale.
    pub fn record(
        &mut self,
        zone: u16,
        result: Result<FlowDump, DomainError>,
    ) -> Result<FilterStats, DomainError> {
        let snapshot = self.snapshots.entry(zone).or_default();
        match result {
            Ok(dump) => {
                let stats = dump.stats;
                self.metrics.record_dump(zone, "ok");
                self.metrics
                    .set_zone_connections(zone, "total", stats.total as u64);
                self.metrics
                    .set_zone_connections(zone, "kept", stats.kept as u64);
                for reason in DropReason::ALL {
                    let dropped = stats.dropped(reason);
                    if dropped > 0 {
                        self.metrics.record_filtered(reason.as_str(), dropped as u64);
                    }
                }

                *snapshot = ZoneSnapshot {
                    connections: dump.connections,
                    stats,
                    polled_at: Some(SystemTime::now()),
                    stale: false,
                    last_error: None,
                };
                debug!(zone, kept = stats.kept, "conntrack snapshot updated");
                Ok(stats)
            }
            Err(e) => {
                self.metrics.record_dump(zone, "error");
                warn!(zone, error = %e, "conntrack dump failed, keeping previous snapshot");
                snapshot.stale = true;
                snapshot.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Read the table capacity once and publish it.
    pub fn refresh_max_connections(&mut self) -> Result<u64, DomainError> {
        let max = self.dumper.max_connections()?;
        self.metrics.set_max_connections(max);
        self.max_connections = Some(max);
        Ok(max)
    }

    /// Table capacity as of the last successful refresh.
    pub fn max_connections(&self) -> Option<u64> {
        self.max_connections
    }

    pub fn snapshot(&self, zone: u16) -> Option<&ZoneSnapshot> {
        self.snapshots.get(&zone)
    }

    /// Connections of the last snapshot of `zone`, up to `limit`.
    pub fn connections(&self, zone: u16, limit: usize) -> Option<&[Connection]> {
        self.snapshots.get(&zone).map(|snapshot| {
            let end = snapshot.connections.len().min(limit);
            &snapshot.connections[..end]
        })
    }

    pub fn status(&self) -> Vec<ZoneStatus> {
        self.snapshots
            .iter()
            .map(|(zone, snapshot)| ZoneStatus {
                zone: *zone,
                connections: snapshot.connections.len(),
                stats: snapshot.stats,
                polled_at_unix_secs: snapshot.polled_at.and_then(|t| {
                    t.duration_since(SystemTime::UNIX_EPOCH)
                        .ok()
                        .map(|d| d.as_secs())
                }),
                stale: snapshot.stale,
                last_error: snapshot.last_error.clone(),
            })
            .collect()
    }

    /// Whether every zone has been dumped successfully at least once.
    pub fn is_ready(&self) -> bool {
        self.snapshots.values().all(|s| s.polled_at.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    use super::*;
    use domain::conntrack::entity::{CT_ZONE, CT_ZONE_V6, Tuple};
    use ports::secondary::metrics_port::{DumpMetrics, FilterMetrics};
    use ports::test_utils::NoopMetrics;

    fn conn(zone: u16, last_octet: u8) -> Connection {
        Connection {
            flow_key: Tuple {
                src_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
                dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 1, last_octet)),
                src_port: 40000,
                dst_port: 443,
                protocol: 6,
            },
            zone,
            is_present: true,
            ..Connection::default()
        }
    }

    /// Dumper whose per-call result is scripted by the test.
    struct ScriptedDumper {
        results: Mutex<Vec<Result<FlowDump, DomainError>>>,
    }

    impl ScriptedDumper {
        fn new(mut results: Vec<Result<FlowDump, DomainError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
            }
        }
    }

    impl ConnTrackDumper for ScriptedDumper {
        fn dump_flows(&self, _zone: u16) -> Result<FlowDump, DomainError> {
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(FlowDump::default()))
        }

        fn max_connections(&self) -> Result<u64, DomainError> {
            Ok(65_536)
        }
    }

    fn dump(conns: Vec<Connection>, total: usize) -> FlowDump {
        let kept = conns.len();
        FlowDump {
            connections: conns,
            stats: FilterStats {
                total,
                kept,
                dropped_gateway: total - kept,
                ..FilterStats::default()
            },
        }
    }

    #[derive(Default)]
    struct RecordingMetrics {
        dumps: Mutex<Vec<(u16, String)>>,
        filtered: Mutex<Vec<(String, u64)>>,
        max: Mutex<Option<u64>>,
    }

    impl DumpMetrics for RecordingMetrics {
        fn record_dump(&self, zone: u16, result: &str) {
            self.dumps.lock().unwrap().push((zone, result.to_string()));
        }

        fn set_max_connections(&self, count: u64) {
            *self.max.lock().unwrap() = Some(count);
        }
    }

    impl FilterMetrics for RecordingMetrics {
        fn record_filtered(&self, reason: &str, count: u64) {
            self.filtered
                .lock()
                .unwrap()
                .push((reason.to_string(), count));
        }
    }

    fn service(results: Vec<Result<FlowDump, DomainError>>, zones: Vec<u16>) -> ConnTrackPollService {
        ConnTrackPollService::new(
            Arc::new(ScriptedDumper::new(results)),
            Arc::new(NoopMetrics),
            zones,
        )
    }

    #[test]
    fn new_service_is_not_ready() {
        let svc = service(Vec::new(), vec![CT_ZONE]);
        assert!(!svc.is_ready());
        assert_eq!(svc.zones(), &[CT_ZONE]);
        assert!(svc.snapshot(CT_ZONE).unwrap().polled_at.is_none());
    }

    #[test]
    fn successful_poll_stores_snapshot() {
        let mut svc = service(vec![Ok(dump(vec![conn(CT_ZONE, 1), conn(CT_ZONE, 2)], 3))], vec![CT_ZONE]);
        let stats = svc.poll_zone(CT_ZONE).unwrap();
        assert_eq!(stats.kept, 2);
        let snapshot = svc.snapshot(CT_ZONE).unwrap();
        assert_eq!(snapshot.connections.len(), 2);
        assert!(!snapshot.stale);
        assert!(svc.is_ready());
    }

    #[test]
    fn failed_poll_keeps_previous_snapshot_as_stale() {
        let mut svc = service(
            vec![
                Ok(dump(vec![conn(CT_ZONE, 1)], 1)),
                Err(DomainError::EngineError("table unreadable".to_string())),
            ],
            vec![CT_ZONE],
        );
        svc.poll_zone(CT_ZONE).unwrap();
        assert!(svc.poll_zone(CT_ZONE).is_err());

        let snapshot = svc.snapshot(CT_ZONE).unwrap();
        assert_eq!(snapshot.connections.len(), 1);
        assert!(snapshot.stale);
        assert!(snapshot.last_error.as_deref().unwrap().contains("table unreadable"));
    }

    #[test]
    fn recovery_clears_stale_flag() {
        let mut svc = service(
            vec![
                Err(DomainError::EngineError("busy".to_string())),
                Ok(dump(vec![conn(CT_ZONE, 9)], 1)),
            ],
            vec![CT_ZONE],
        );
        assert!(svc.poll_zone(CT_ZONE).is_err());
        assert!(!svc.is_ready());
        svc.poll_zone(CT_ZONE).unwrap();
        let snapshot = svc.snapshot(CT_ZONE).unwrap();
        assert!(!snapshot.stale);
        assert!(snapshot.last_error.is_none());
    }

    #[test]
    fn poll_all_counts_failures() {
        let mut svc = service(
            vec![
                Ok(dump(vec![conn(CT_ZONE, 1)], 1)),
                Err(DomainError::EngineError("v6 table unreadable".to_string())),
            ],
            vec![CT_ZONE, CT_ZONE_V6],
        );
        assert_eq!(svc.poll_all(), 1);
        assert!(!svc.snapshot(CT_ZONE).unwrap().stale);
        assert!(svc.snapshot(CT_ZONE_V6).unwrap().stale);
    }

    #[test]
    fn connections_respects_limit() {
        let conns = (1..=5).map(|i| conn(CT_ZONE, i)).collect();
        let mut svc = service(vec![Ok(dump(conns, 5))], vec![CT_ZONE]);
        svc.poll_zone(CT_ZONE).unwrap();
        assert_eq!(svc.connections(CT_ZONE, 2).unwrap().len(), 2);
        assert_eq!(svc.connections(CT_ZONE, 100).unwrap().len(), 5);
        assert!(svc.connections(1, 10).is_none());
    }

    #[test]
    fn status_lists_every_zone() {
        let mut svc = service(vec![Ok(dump(vec![conn(CT_ZONE, 1)], 4))], vec![CT_ZONE, CT_ZONE_V6]);
        svc.poll_zone(CT_ZONE).unwrap();
        let status = svc.status();
        assert_eq!(status.len(), 2);
        let v4 = status.iter().find(|s| s.zone == CT_ZONE).unwrap();
        assert_eq!(v4.connections, 1);
        assert_eq!(v4.stats.total, 4);
        assert!(v4.polled_at_unix_secs.is_some());
        let v6 = status.iter().find(|s| s.zone == CT_ZONE_V6).unwrap();
        assert!(v6.polled_at_unix_secs.is_none());
    }

    #[test]
    fn metrics_follow_poll_outcomes() {
        let metrics = Arc::new(RecordingMetrics::default());
        let mut svc = ConnTrackPollService::new(
            Arc::new(ScriptedDumper::new(vec![
                Ok(dump(vec![conn(CT_ZONE, 1)], 3)),
                Err(DomainError::EngineError("boom".to_string())),
            ])),
            metrics.clone(),
            vec![CT_ZONE],
        );
        svc.poll_zone(CT_ZONE).unwrap();
        let _ = svc.poll_zone(CT_ZONE);

        let dumps = metrics.dumps.lock().unwrap().clone();
        assert_eq!(
            dumps,
            vec![(CT_ZONE, "ok".to_string()), (CT_ZONE, "error".to_string())]
        );
        let filtered = metrics.filtered.lock().unwrap().clone();
        assert_eq!(filtered, vec![("gateway".to_string(), 2)]);
    }

    #[test]
    fn refresh_max_connections_publishes_gauge() {
        let metrics = Arc::new(RecordingMetrics::default());
        let mut svc = ConnTrackPollService::new(
            Arc::new(ScriptedDumper::new(Vec::new())),
            metrics.clone(),
            vec![CT_ZONE],
        );
        assert_eq!(svc.max_connections(), None);
        assert_eq!(svc.refresh_max_connections().unwrap(), 65_536);
        assert_eq!(svc.max_connections(), Some(65_536));
        assert_eq!(*metrics.max.lock().unwrap(), Some(65_536));
    }

    #[test]
    fn record_accepts_externally_run_dump() {
        let mut svc = service(Vec::new(), vec![CT_ZONE]);
        let dumper = svc.dumper();
        let result = dumper.dump_flows(CT_ZONE);
        assert!(svc.record(CT_ZONE, result).is_ok());
        assert!(svc.is_ready());
    }
}
