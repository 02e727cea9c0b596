use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use domain::common::error::DomainError;
use domain::conntrack::entity::Connection;

use crate::secondary::conntrack_table_port::ConnTrackTablePort;
use crate::secondary::metrics_port::{DumpMetrics, FilterMetrics};

/// No-op implementation of all metrics sub-traits for use in tests.
///
/// All methods inherit the default no-op implementations from the sub-traits.
pub struct NoopMetrics;

impl DumpMetrics for NoopMetrics {}
impl FilterMetrics for NoopMetrics {}

/// Table port returning a canned snapshot, or failing every query.
///
/// The snapshot is returned unfiltered for any zone, like a backend that
/// cannot push the zone down into the query.
pub struct StaticConnTrackTable {
    snapshot: Mutex<Result<Vec<Connection>, String>>,
    max_connections: u64,
    queries: AtomicUsize,
}

impl StaticConnTrackTable {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            snapshot: Mutex::new(Ok(connections)),
            max_connections: 262_144,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            snapshot: Mutex::new(Err(reason.to_string())),
            max_connections: 0,
            queries: AtomicUsize::new(0),
        }
    }

    /// Replace the snapshot returned by subsequent queries.
    pub fn set_snapshot(&self, snapshot: Result<Vec<Connection>, String>) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = snapshot;
        }
    }

    /// Number of `dump_zone` calls served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl ConnTrackTablePort for StaticConnTrackTable {
    fn dump_zone(&self, _zone: u16) -> Result<Vec<Connection>, DomainError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| DomainError::EngineError("snapshot lock poisoned".to_string()))?;
        guard.clone().map_err(DomainError::EngineError)
    }

    fn max_connections(&self) -> Result<u64, DomainError> {
        match &*self
            .snapshot
            .lock()
            .map_err(|_| DomainError::EngineError("snapshot lock poisoned".to_string()))?
        {
            Ok(_) => Ok(self.max_connections),
            Err(reason) => Err(DomainError::EngineError(reason.clone())),
        }
    }
}
