use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use super::conntrack_handler::{conntrack_status, list_connections};
use super::health_handler::{healthz, readyz};
use super::metrics_handler::metrics;
use super::state::AppState;

/// Build the Axum router.
///
/// Routes are split into two groups:
/// 1. **Probes and metrics**: `/healthz`, `/readyz`, `/metrics`
/// 2. **Diagnostics**: `/api/v1/conntrack/*`, a read-only view of the last
///    filtered snapshot per zone
pub fn build_router(state: Arc<AppState>) -> Router {
    let probe_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics));

    let api_routes = Router::new()
        .route("/api/v1/conntrack/status", get(conntrack_status))
        .route("/api/v1/conntrack/connections", get(list_connections));

    probe_routes.merge(api_routes).with_state(state)
}
