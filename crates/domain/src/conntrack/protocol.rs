//! Protocol allow-list for exported connections.

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;

/// Set of IP protocol numbers a connection must match to be kept.
///
/// An empty filter places no restriction on the protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFilter {
    protocols: Vec<u8>,
}

impl ProtocolFilter {
    /// Filter that accepts every protocol.
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a filter from protocol numbers. Duplicates are collapsed.
    pub fn from_numbers(numbers: impl IntoIterator<Item = u8>) -> Self {
        let mut protocols: Vec<u8> = numbers.into_iter().collect();
        protocols.sort_unstable();
        protocols.dedup();
        Self { protocols }
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Whether a connection with this protocol number passes the filter.
    pub fn allows(&self, protocol: u8) -> bool {
        self.protocols.is_empty() || self.protocols.binary_search(&protocol).is_ok()
    }

    /// The protocol numbers in ascending order.
    pub fn protocols(&self) -> &[u8] {
        &self.protocols
    }
}

/// Outcome of [`validate_protocol_filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolFilterValidation {
    /// Filter built from the recognized names.
    pub filter: ProtocolFilter,
    /// Names that matched no known protocol, in input order.
    pub unsupported: Vec<String>,
}

impl ProtocolFilterValidation {
    pub fn has_unsupported(&self) -> bool {
        !self.unsupported.is_empty()
    }
}

/// Resolve configured protocol names (`tcp`, `UDP`, `Sctp`, ...) into a filter.
///
/// Never fails: unknown names are returned in `unsupported` for the caller to
/// report and are left out of the filter.
pub fn validate_protocol_filter<S: AsRef<str>>(names: &[S]) -> ProtocolFilterValidation {
    let mut numbers = Vec::with_capacity(names.len());
    let mut unsupported = Vec::new();

    for name in names {
        let name = name.as_ref();
        match Protocol::from_service_name(name) {
            Some(proto) => numbers.push(proto.to_u8()),
            None => unsupported.push(name.to_string()),
        }
    }

    ProtocolFilterValidation {
        filter: ProtocolFilter::from_numbers(numbers),
        unsupported,
    }
}
