use std::path::{Path, PathBuf};
use std::time::SystemTime;

use domain::common::error::DomainError;
use domain::conntrack::entity::Connection;
use ports::secondary::conntrack_table_port::ConnTrackTablePort;
use tracing::debug;

use super::proc_parser::parse_table;

/// Connection table read from the kernel's procfs text dump.
///
/// Every call re-reads the file, so each dump is a fresh snapshot.
pub struct ProcConnTrackTable {
    table_path: PathBuf,
    max_path: PathBuf,
}

impl ProcConnTrackTable {
    pub fn new(table_path: impl Into<PathBuf>, max_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
            max_path: max_path.into(),
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }
}

fn read(path: &Path) -> Result<String, DomainError> {
    std::fs::read_to_string(path)
        .map_err(|e| DomainError::EngineError(format!("failed to read {}: {e}", path.display())))
}

impl ConnTrackTablePort for ProcConnTrackTable {
    fn dump_zone(&self, zone: u16) -> Result<Vec<Connection>, DomainError> {
        let content = read(&self.table_path)?;
        let (connections, skipped) = parse_table(&content, zone, SystemTime::now());
        if skipped > 0 {
            debug!(
                zone,
                skipped,
                path = %self.table_path.display(),
                "skipped unparseable conntrack entries"
            );
        }
        Ok(connections)
    }

    fn max_connections(&self) -> Result<u64, DomainError> {
        let content = read(&self.max_path)?;
        content.trim().parse().map_err(|_| {
            DomainError::EngineError(format!(
                "invalid value in {}: '{}'",
                self.max_path.display(),
                content.trim()
            ))
        })
    }
}
