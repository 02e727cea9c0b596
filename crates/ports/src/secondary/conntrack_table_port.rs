use domain::common::error::DomainError;
use domain::conntrack::entity::Connection;

/// Secondary port for raw connection-table access.
///
/// Implemented per operating system in the adapter layer. Implementations
/// return a complete snapshot or an error; partial results are not allowed.
pub trait ConnTrackTablePort: Send + Sync {
    /// Return every entry currently tracked in `zone`, both address families.
    ///
    /// Entries of other zones may be included when the backend cannot filter
    /// by zone; callers re-check the zone.
    fn dump_zone(&self, zone: u16) -> Result<Vec<Connection>, DomainError>;

    /// Return the maximum number of entries the table can hold.
    fn max_connections(&self) -> Result<u64, DomainError>;
}
