use std::time::Duration;

// ── Network defaults ───────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ctflow/config.yaml";
pub const DEFAULT_HTTP_PORT: u16 = 9090;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

// ── Connection table ───────────────────────────────────────────────

pub const DEFAULT_TABLE_PATH: &str = "/proc/net/nf_conntrack";
pub const DEFAULT_MAX_PATH: &str = "/proc/sys/net/netfilter/nf_conntrack_max";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

// ── Timeouts ───────────────────────────────────────────────────────

/// Upper bound on a single zone dump; a slower dump counts as failed.
pub const DUMP_TIMEOUT: Duration = Duration::from_secs(10);

pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_timeout_fits_poll_interval() {
        assert!(DUMP_TIMEOUT.as_secs() >= DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn shutdown_timeout_is_reasonable() {
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() >= 1);
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() <= 30);
    }

    #[test]
    fn default_paths_are_absolute() {
        assert!(DEFAULT_CONFIG_PATH.starts_with('/'));
        assert!(DEFAULT_TABLE_PATH.starts_with("/proc/"));
        assert!(DEFAULT_MAX_PATH.starts_with("/proc/"));
    }
}
