use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    /// `"ready"` or `"not_ready"`.
    pub status: &'static str,
    /// Zones not yet dumped successfully.
    pub pending_zones: Vec<u16>,
}

/// Liveness probe: always returns 200 if the process is running.
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness probe: 200 once every zone has been dumped, 503 before that.
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let svc = state.conntrack_service.read().await;
    let pending_zones: Vec<u16> = svc
        .status()
        .into_iter()
        .filter(|zone| zone.polled_at_unix_secs.is_none())
        .map(|zone| zone.zone)
        .collect();
    let ready = svc.is_ready();
    let (code, status) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (
        code,
        Json(ReadyResponse {
            status,
            pending_zones,
        }),
    )
}
