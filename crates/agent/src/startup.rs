use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use adapters::conntrack::proc_table::ProcConnTrackTable;
use adapters::http::{AppState, run_http_server};
use application::conntrack_dumper_impl::{DumperSettings, initialize_conntrack_dumper};
use application::conntrack_service_impl::ConnTrackPollService;
use domain::common::error::DomainError;
use infrastructure::config::AgentConfig;
use infrastructure::constants::{DUMP_TIMEOUT, GRACEFUL_SHUTDOWN_TIMEOUT};
use infrastructure::logging::init_logging;
use infrastructure::metrics::AgentMetrics;
use ports::primary::conntrack_dumper::{ConnTrackDumper, FlowDump};
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Build the dumper for the configured datapath, backed by the procfs table.
pub fn build_dumper(config: &AgentConfig) -> anyhow::Result<Box<dyn ConnTrackDumper>> {
    let settings = DumperSettings {
        node: config.node_config(),
        service_cidrs: config.service_cidrs()?,
        datapath: config.conntrack.datapath,
        proxy_enabled: config.conntrack.proxy_enabled,
        protocol_filter: config.conntrack.protocol_filter.clone(),
    };
    let table = ProcConnTrackTable::new(&config.conntrack.table_path, &config.conntrack.max_path);
    Ok(initialize_conntrack_dumper(&settings, Box::new(table))?)
}

/// Run the agent daemon until SIGINT/SIGTERM.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let config = AgentConfig::load(Path::new(&cli.config))?;

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over config file
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    // Service root span: fields appear in every subsequent log entry
    let _root_span = tracing::span!(
        tracing::Level::INFO,
        "service",
        service.name = "ctflow",
        service.version = env!("CARGO_PKG_VERSION"),
    )
    .entered();

    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "ctflow agent starting"
    );

    // ── 3. Build the dumper; an unsupported datapath is fatal ──────
    let dumper: Arc<dyn ConnTrackDumper> = Arc::from(build_dumper(&config)?);
    let zones = config.zones();

    // ── 4. Initialize metrics and the poll service ─────────────────
    let metrics = Arc::new(AgentMetrics::new());
    let mut service = ConnTrackPollService::new(
        dumper,
        Arc::clone(&metrics) as Arc<dyn MetricsPort>,
        zones.clone(),
    );
    match service.refresh_max_connections() {
        Ok(max) => info!(max_connections = max, "connection table capacity"),
        Err(e) => warn!(error = %e, "failed to read connection table capacity"),
    }
    let conntrack_svc = Arc::new(RwLock::new(service));
    let app_state = Arc::new(AppState::new(
        Arc::clone(&metrics),
        Arc::clone(&conntrack_svc),
    ));

    let cancel_token = create_shutdown_token()?;

    // ── 5. Spawn HTTP server ──────────────────────────────────────
    let http_port = config.agent.http_port;
    let http_bind = config.agent.bind_address.clone();
    let http_shutdown = cancel_token.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = run_http_server(
            app_state,
            &http_bind,
            http_port,
            http_shutdown.cancelled_owned(),
        )
        .await
        {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    // ── 6. Spawn the poll loop ─────────────────────────────────────
    let poll_interval = Duration::from_secs(config.conntrack.poll_interval_secs);
    info!(
        zones = ?zones,
        interval_secs = poll_interval.as_secs(),
        "conntrack poller starting"
    );
    let poll_cancel = cancel_token.clone();
    let poll_svc = Arc::clone(&conntrack_svc);
    let poll_handle = tokio::spawn(async move {
        let mut pending = PendingDumps::default();
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = poll_cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            poll_zones(&poll_svc, &zones, DUMP_TIMEOUT, &mut pending).await;
        }
    });

    // ── 7. Ready: wait for cancellation ─────────────────────────────
    info!("agent ready, waiting for shutdown signal");
    cancel_token.cancelled().await;

    // ── 8. Ordered shutdown sequence ────────────────────────────────
    info!("shutdown phase 1: stopping poller");
    let _ = tokio::time::timeout(DUMP_TIMEOUT, poll_handle).await;

    info!("shutdown phase 2: draining HTTP connections");
    let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, http_handle).await;

    info!("agent stopped");
    Ok(())
}

/// Blocking dumps that outlived their timeout, by zone.
///
/// A timed-out dump cannot be cancelled; it keeps its blocking thread until
/// the read returns.
#[derive(Default)]
pub struct PendingDumps(HashMap<u16, JoinHandle<Result<FlowDump, DomainError>>>);

impl PendingDumps {
    fn is_running(&mut self, zone: u16) -> bool {
        match self.0.get(&zone) {
            Some(task) if !task.is_finished() => true,
            Some(_) => {
                // Result is outdated; the zone is dumped afresh.
                self.0.remove(&zone);
                false
            }
            None => false,
        }
    }
}

/// Dump every zone once and hand the results to the poll service.
///
/// Dumps are blocking reads, so they run on the blocking pool, outside the
/// service lock. A dump slower than `timeout` is recorded as a failure, and
/// its zone is skipped until that dump returns.
pub async fn poll_zones(
    svc: &RwLock<ConnTrackPollService>,
    zones: &[u16],
    timeout: Duration,
    pending: &mut PendingDumps,
) {
    let dumper = svc.read().await.dumper();
    for &zone in zones {
        if pending.is_running(zone) {
            warn!(zone, "previous dump still running, skipping zone");
            let _ = svc.write().await.record(
                zone,
                Err(DomainError::EngineError(format!(
                    "previous dump of zone {zone} still running"
                ))),
            );
            continue;
        }

        let dumper = Arc::clone(&dumper);
        let mut task = tokio::task::spawn_blocking(move || dumper.dump_flows(zone));
        let outcome = tokio::time::timeout(timeout, &mut task).await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DomainError::EngineError(format!("dump task failed: {e}"))),
            Err(_) => {
                pending.0.insert(zone, task);
                Err(DomainError::EngineError(format!(
                    "dump of zone {zone} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        };
        // Failures are logged and metered by the service.
        let _ = svc.write().await.record(zone, result);
    }
}
