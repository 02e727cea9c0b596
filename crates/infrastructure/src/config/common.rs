//! Shared parsing helpers and error types used across config modules.

use domain::common::network::IpNetwork;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid CIDR notation '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Parsing helpers ────────────────────────────────────────────────

/// Parse a CIDR string into an `IpNetwork`.
///
/// Supports both IPv4 (`"10.96.0.0/12"`, `"10.0.0.1"`) and
/// IPv6 (`"fd00:10:96::/112"`, `"::1"`).
pub fn parse_cidr(s: &str) -> Result<IpNetwork, ConfigError> {
    s.trim().parse().map_err(|e| ConfigError::InvalidCidr {
        value: s.to_string(),
        reason: format!("{e}"),
    })
}

/// Parse a CIDR of a given family for the config key `field`.
pub(super) fn parse_cidr_family(
    field: &str,
    s: &str,
    want_v6: bool,
) -> Result<IpNetwork, ConfigError> {
    let network = parse_cidr(s)?;
    if network.is_v6() != want_v6 {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!(
                "'{s}' is not an {} prefix",
                if want_v6 { "IPv6" } else { "IPv4" }
            ),
        });
    }
    Ok(network)
}
