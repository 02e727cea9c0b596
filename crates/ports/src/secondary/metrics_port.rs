// Focused sub-traits for recording Prometheus metrics.
//
// All methods take `&self` because the underlying implementation uses
// atomic operations (interior mutability via `prometheus-client`).
//
// Default implementations are no-ops, allowing test mocks to implement
// only the sub-traits relevant to the service under test.

// ── Table dump metrics ─────────────────────────────────────────────

pub trait DumpMetrics: Send + Sync {
    /// Record the outcome of one zone dump (`ok` or `error`).
    fn record_dump(&self, _zone: u16, _result: &str) {}

    /// Set the number of connections seen at a given stage (`total`, `kept`)
    /// of the last dump of a zone.
    fn set_zone_connections(&self, _zone: u16, _stage: &str, _count: u64) {}

    /// Set the capacity of the connection table.
    fn set_max_connections(&self, _count: u64) {}
}

// ── Filter chain metrics ───────────────────────────────────────────

pub trait FilterMetrics: Send + Sync {
    /// Add `count` connections dropped by the filter stage `reason`.
    fn record_filtered(&self, _reason: &str, _count: u64) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port composing all sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>` for full access.
pub trait MetricsPort: DumpMetrics + FilterMetrics {}

/// Blanket implementation: any type implementing all sub-traits automatically
/// implements `MetricsPort`.
impl<T> MetricsPort for T where T: DumpMetrics + FilterMetrics {}
