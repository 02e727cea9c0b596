use std::io;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Create a `CancellationToken` cancelled on SIGINT or SIGTERM.
///
/// Every long-running task gets a clone and stops when it fires. Fails when
/// the signal handlers cannot be installed.
pub fn create_shutdown_token() -> io::Result<CancellationToken> {
    let mut signals = ShutdownSignals::install()?;
    let token = CancellationToken::new();
    let on_signal = token.clone();

    tokio::spawn(async move {
        if let Some(signal) = signals.recv().await {
            tracing::info!(signal, "shutdown signal received");
            on_signal.cancel();
        }
    });

    Ok(token)
}

/// Installed SIGINT/SIGTERM listeners.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the first signal and return its name.
    async fn recv(&mut self) -> Option<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Some("SIGINT"),
                _ = self.terminate.recv() => Some("SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(()) => Some("SIGINT"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C, shutdown signal disabled");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn token_stays_live_without_a_signal() {
        let token = create_shutdown_token().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn clones_observe_cancellation() {
        let token = create_shutdown_token().unwrap();
        let child = token.clone();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
