//! Agent configuration: structs, parsing, and validation.
//!
//! The config module is split across sub-modules:
//! - `common`: shared helpers and `ConfigError`
//! - `conntrack`: node, Service CIDR, and connection-table sections

mod common;
mod conntrack;

// ── Public re-exports ─────────────────────────────────────────────

pub use common::{ConfigError, parse_cidr};
pub use conntrack::{ConnTrackConfig, NodeSection, ServiceCidrSection};

use std::path::Path;

use domain::conntrack::entity::{NodeConfig, ServiceCidrs};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_HTTP_PORT};

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub service_cidr: ServiceCidrSection,

    #[serde(default)]
    pub conntrack: ConnTrackConfig,
}

impl AgentConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Validation {
                field: "agent.bind_address".to_string(),
                message: format!("'{}' is not an IP address", self.agent.bind_address),
            });
        }

        self.service_cidr.to_domain()?;
        self.conntrack.validate()?;
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        self.node.to_domain()
    }

    pub fn service_cidrs(&self) -> Result<ServiceCidrs, ConfigError> {
        self.service_cidr.to_domain()
    }

    /// Zones to poll, with the default resolved.
    pub fn zones(&self) -> Vec<u16> {
        self.conntrack.effective_zones(&self.node)
    }
}

// ── Agent section ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Port of the health, metrics, and conntrack debug endpoints.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// IP address for the HTTP server to bind to.
    /// Defaults to `127.0.0.1` (localhost only). Set to `0.0.0.0` to listen
    /// on all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
