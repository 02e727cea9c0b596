use thiserror::Error;

use crate::conntrack::error::ConnTrackError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("engine error: {0}")]
    EngineError(String),
}

impl From<ConnTrackError> for DomainError {
    fn from(err: ConnTrackError) -> Self {
        match err {
            ConnTrackError::QueryFailed { .. } => Self::EngineError(err.to_string()),
            ConnTrackError::UnsupportedDatapath { .. } | ConnTrackError::InvalidConfig { .. } => {
                Self::InvalidConfig(err.to_string())
            }
        }
    }
}
