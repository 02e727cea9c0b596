use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel};

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialize structured logging.
///
/// - `LogFormat::Json`: flattened JSON on stdout, for log aggregators.
/// - `LogFormat::Text`: human-readable output on stderr, so that commands
///   printing JSON to stdout (`dump`) stay machine-readable.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_log_level_is_a_valid_filter() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(
                EnvFilter::try_new(level.as_str()).is_ok(),
                "{} should be a valid filter",
                level.as_str()
            );
        }
    }

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let first = init_logging(LogLevel::Info, LogFormat::Json);
        let second = init_logging(LogLevel::Debug, LogFormat::Text);
        // Another test may have installed a subscriber first; either way the
        // second call must report an error.
        let _ = first;
        assert!(second.is_err());
    }
}
