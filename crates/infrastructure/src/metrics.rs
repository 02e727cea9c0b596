use ports::secondary::metrics_port::{DumpMetrics, FilterMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DumpLabels {
    pub zone: String,
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StageLabels {
    pub zone: String,
    pub stage: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabels {
    pub reason: String,
}

// ── Agent metrics registry ──────────────────────────────────────────

/// Prometheus metrics registry for the agent.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. The registry itself is NOT Clone;
/// wrap in `Arc` for multi-task sharing.
pub struct AgentMetrics {
    registry: Registry,
    pub conntrack_dumps_total: Family<DumpLabels, Counter>,
    pub conntrack_connections: Family<StageLabels, Gauge>,
    pub conntrack_dropped_total: Family<ReasonLabels, Counter>,
    pub conntrack_max_connections: Gauge,
}

impl AgentMetrics {
    /// Create a new metrics registry with all metrics registered under
    /// the `ctflow` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("ctflow");

        let conntrack_dumps_total = Family::<DumpLabels, Counter>::default();
        registry.register(
            "conntrack_dumps",
            "Connection table dumps per zone and outcome",
            conntrack_dumps_total.clone(),
        );

        let conntrack_connections = Family::<StageLabels, Gauge>::default();
        registry.register(
            "conntrack_connections",
            "Connections in the last dump of a zone, before and after filtering",
            conntrack_connections.clone(),
        );

        let conntrack_dropped_total = Family::<ReasonLabels, Counter>::default();
        registry.register(
            "conntrack_dropped",
            "Connections removed by the filter chain, per stage",
            conntrack_dropped_total.clone(),
        );

        let conntrack_max_connections = Gauge::default();
        registry.register(
            "conntrack_max_connections",
            "Capacity of the kernel connection table",
            conntrack_max_connections.clone(),
        );

        Self {
            registry,
            conntrack_dumps_total,
            conntrack_connections,
            conntrack_dropped_total,
            conntrack_max_connections,
        }
    }

    /// Encode all registered metrics to `OpenMetrics` text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buffer
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauges are `i64`.
fn gauge_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// ── Sub-trait implementations ──────────────────────────────────────

impl DumpMetrics for AgentMetrics {
    fn record_dump(&self, zone: u16, result: &str) {
        self.conntrack_dumps_total
            .get_or_create(&DumpLabels {
                zone: zone.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    fn set_zone_connections(&self, zone: u16, stage: &str, count: u64) {
        self.conntrack_connections
            .get_or_create(&StageLabels {
                zone: zone.to_string(),
                stage: stage.to_string(),
            })
            .set(gauge_value(count));
    }

    fn set_max_connections(&self, count: u64) {
        self.conntrack_max_connections.set(gauge_value(count));
    }
}

impl FilterMetrics for AgentMetrics {
    fn record_filtered(&self, reason: &str, count: u64) {
        self.conntrack_dropped_total
            .get_or_create(&ReasonLabels {
                reason: reason.to_string(),
            })
            .inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::secondary::metrics_port::MetricsPort;

    #[test]
    fn new_creates_valid_registry() {
        let metrics = AgentMetrics::new();
        let encoded = metrics.encode();
        // OpenMetrics EOF marker
        assert!(encoded.contains("# EOF"));
    }

    #[test]
    fn dump_counter_appears_in_output() {
        let metrics = AgentMetrics::new();
        metrics.record_dump(65520, "ok");
        metrics.record_dump(65520, "ok");
        metrics.record_dump(65510, "error");

        let encoded = metrics.encode();
        assert!(encoded.contains("ctflow_conntrack_dumps_total"));
        assert!(encoded.contains("zone=\"65520\""));
        assert!(encoded.contains("result=\"ok\""));
        assert!(encoded.contains("result=\"error\""));
    }

    #[test]
    fn zone_connections_gauge() {
        let metrics = AgentMetrics::new();
        metrics.set_zone_connections(65520, "total", 120);
        metrics.set_zone_connections(65520, "kept", 97);

        let encoded = metrics.encode();
        assert!(encoded.contains("ctflow_conntrack_connections"));
        assert!(encoded.contains("stage=\"kept\""));
        assert!(encoded.contains("97"));
    }

    #[test]
    fn dropped_counter_accumulates() {
        let metrics = AgentMetrics::new();
        metrics.record_filtered("service_cidr", 3);
        metrics.record_filtered("service_cidr", 4);

        let value = metrics
            .conntrack_dropped_total
            .get_or_create(&ReasonLabels {
                reason: "service_cidr".to_string(),
            })
            .get();
        assert_eq!(value, 7);
        assert!(metrics.encode().contains("reason=\"service_cidr\""));
    }

    #[test]
    fn max_connections_gauge() {
        let metrics = AgentMetrics::new();
        metrics.set_max_connections(262_144);
        assert_eq!(metrics.conntrack_max_connections.get(), 262_144);
        assert!(metrics.encode().contains("ctflow_conntrack_max_connections 262144"));
    }

    #[test]
    fn gauge_value_saturates() {
        assert_eq!(gauge_value(u64::MAX), i64::MAX);
        assert_eq!(gauge_value(5), 5);
    }

    #[test]
    fn metrics_port_trait_impl() {
        let metrics = AgentMetrics::new();
        let port: &dyn MetricsPort = &metrics;
        port.record_dump(65520, "ok");
        port.set_zone_connections(65520, "total", 1);
        port.set_max_connections(10);
        port.record_filtered("zone", 1);

        let encoded = metrics.encode();
        assert!(encoded.contains("ctflow_conntrack_dropped_total"));
    }
}
