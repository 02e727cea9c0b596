use std::sync::Arc;

use application::conntrack_service_impl::ZoneStatus;
use axum::Json;
use axum::extract::{Query, State};
use domain::conntrack::entity::Connection;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::AppState;

/// Upper bound on `limit` for the connection listing.
const MAX_LIMIT: usize = 10_000;

// ── Response DTOs ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnTrackStatusResponse {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub max_connections: Option<u64>,
    pub zones: Vec<ZoneStatus>,
}

#[derive(Serialize)]
pub struct ConnectionResponse {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub original_dst_ip: Option<String>,
    pub original_dst_port: Option<u16>,
    pub state: Option<&'static str>,
    pub mark: u32,
    pub timeout: u32,
    pub packets_fwd: u64,
    pub packets_rev: u64,
    pub bytes_fwd: u64,
    pub bytes_rev: u64,
}

impl From<&Connection> for ConnectionResponse {
    fn from(c: &Connection) -> Self {
        Self {
            src_ip: c.flow_key.src_addr.to_string(),
            dst_ip: c.flow_key.dst_addr.to_string(),
            src_port: c.flow_key.src_port,
            dst_port: c.flow_key.dst_port,
            protocol: c.flow_key.protocol,
            original_dst_ip: c.original_dst_addr.map(|ip| ip.to_string()),
            original_dst_port: c.original_dst_port,
            state: c.tcp_state.map(|s| s.as_str()),
            mark: c.mark,
            timeout: c.timeout,
            packets_fwd: c.original_packets,
            packets_rev: c.reverse_packets,
            bytes_fwd: c.original_bytes,
            bytes_rev: c.reverse_bytes,
        }
    }
}

#[derive(Serialize)]
pub struct ConnectionsResponse {
    pub zone: u16,
    /// The last poll of this zone failed; the list is from an earlier poll.
    pub stale: bool,
    pub total: usize,
    pub connections: Vec<ConnectionResponse>,
}

// ── Query params ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    /// Defaults to the first configured zone.
    pub zone: Option<u16>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

// ── Handlers ──────────────────────────────────────────────────────

pub async fn conntrack_status(State(state): State<Arc<AppState>>) -> Json<ConnTrackStatusResponse> {
    let svc = state.conntrack_service.read().await;
    Json(ConnTrackStatusResponse {
        version: state.version,
        uptime_secs: state.start_time.elapsed().as_secs(),
        max_connections: svc.max_connections(),
        zones: svc.status(),
    })
}

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    if query.limit == 0 || query.limit > MAX_LIMIT {
        return Err(ApiError::BadRequest {
            code: "INVALID_LIMIT",
            message: format!("limit must be between 1 and {MAX_LIMIT}"),
        });
    }

    let svc = state.conntrack_service.read().await;
    let zone = match query.zone {
        Some(zone) => zone,
        None => *svc
            .zones()
            .first()
            .ok_or_else(|| ApiError::ServiceUnavailable {
                message: "no conntrack zone is configured".to_string(),
            })?,
    };
    let snapshot = svc.snapshot(zone).ok_or_else(|| ApiError::NotFound {
        code: "ZONE_NOT_FOUND",
        message: format!("zone {zone} is not polled"),
    })?;
    let connections = svc
        .connections(zone, query.limit)
        .unwrap_or_default()
        .iter()
        .map(ConnectionResponse::from)
        .collect();

    Ok(Json(ConnectionsResponse {
        zone,
        stale: snapshot.stale,
        total: snapshot.connections.len(),
        connections,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::state::test_support::{connection, state_with};
    use domain::conntrack::entity::{CT_ZONE, CT_ZONE_V6};

    fn query(zone: Option<u16>, limit: usize) -> Query<ListQuery> {
        Query(ListQuery { zone, limit })
    }

    #[test]
    fn default_limit_is_100() {
        assert_eq!(default_limit(), 100);
    }

    #[test]
    fn connection_response_shows_both_destinations() {
        let resp = ConnectionResponse::from(&connection(7));
        assert_eq!(resp.dst_ip, "10.0.1.7");
        assert_eq!(resp.original_dst_ip.as_deref(), Some("10.96.0.10"));
        assert_eq!(resp.original_dst_port, Some(80));
        assert_eq!(resp.packets_fwd, 3);
        assert_eq!(resp.packets_rev, 2);
    }

    #[tokio::test]
    async fn status_lists_polled_zones() {
        let state = state_with(2, false);
        {
            let mut svc = state.conntrack_service.write().await;
            svc.poll_all();
            svc.refresh_max_connections().unwrap();
        }
        let Json(resp) = conntrack_status(State(state)).await;
        assert_eq!(resp.zones.len(), 2);
        assert_eq!(resp.max_connections, Some(262_144));
        let v4 = resp.zones.iter().find(|z| z.zone == CT_ZONE).unwrap();
        assert_eq!(v4.connections, 2);
    }

    #[tokio::test]
    async fn list_defaults_to_first_zone() {
        let state = state_with(3, false);
        state.conntrack_service.write().await.poll_all();
        let Json(resp) = list_connections(State(state), query(None, 2)).await.unwrap();
        assert_eq!(resp.zone, CT_ZONE);
        assert_eq!(resp.total, 3);
        assert_eq!(resp.connections.len(), 2);
        assert!(!resp.stale);
    }

    #[tokio::test]
    async fn list_other_zone_is_filtered() {
        let state = state_with(3, false);
        state.conntrack_service.write().await.poll_all();
        let Json(resp) = list_connections(State(state), query(Some(CT_ZONE_V6), 100))
            .await
            .unwrap();
        assert_eq!(resp.total, 0);
    }

    #[tokio::test]
    async fn list_unknown_zone_is_not_found() {
        let state = state_with(1, false);
        let Err(err) = list_connections(State(state), query(Some(42), 10)).await else {
            panic!("zone 42 is not polled");
        };
        assert!(matches!(err, ApiError::NotFound { code: "ZONE_NOT_FOUND", .. }));
    }

    #[tokio::test]
    async fn list_rejects_bad_limit() {
        let state = state_with(1, false);
        let Err(err) = list_connections(State(state), query(None, 0)).await else {
            panic!("limit 0 must be rejected");
        };
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn list_marks_failed_zone_stale() {
        let state = state_with(0, true);
        state.conntrack_service.write().await.poll_all();
        let Json(resp) = list_connections(State(state), query(None, 10)).await.unwrap();
        assert!(resp.stale);
        assert!(resp.connections.is_empty());
    }
}
