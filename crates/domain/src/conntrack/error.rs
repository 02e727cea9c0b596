use thiserror::Error;

use super::entity::DatapathType;

#[derive(Debug, Error)]
pub enum ConnTrackError {
    #[error("no conntrack dumper available for datapath '{datapath}'")]
    UnsupportedDatapath { datapath: DatapathType },

    #[error("conntrack query failed for zone {zone}: {reason}")]
    QueryFailed { zone: u16, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
