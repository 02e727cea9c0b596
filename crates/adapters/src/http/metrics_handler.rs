use std::sync::Arc;

use axum::extract::State;
use axum::http::header;

use super::state::AppState;

/// Content-Type for `OpenMetrics` text exposition format.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Serves Prometheus metrics in `OpenMetrics` text format.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    let body = state.metrics.encode();
    ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::state::test_support::state_with;
    use ports::secondary::metrics_port::DumpMetrics;

    #[test]
    fn content_type_is_valid() {
        assert!(OPENMETRICS_CONTENT_TYPE.starts_with("application/openmetrics-text"));
        assert!(OPENMETRICS_CONTENT_TYPE.contains("version=1.0.0"));
    }

    #[tokio::test]
    async fn body_contains_registered_metrics() {
        let state = state_with(0, false);
        state.metrics.record_dump(65520, "ok");
        let (headers, body) = metrics(State(state)).await;
        assert_eq!(headers[0].1, OPENMETRICS_CONTENT_TYPE);
        assert!(body.contains("ctflow_conntrack_dumps_total"));
        assert!(body.contains("# EOF"));
    }
}
