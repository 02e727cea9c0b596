use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
pub(crate) struct ErrorDetail {
    /// Machine-readable error code (e.g. `ZONE_NOT_FOUND`).
    code: &'static str,
    message: String,
}

/// Standard API error type.
///
/// All variants produce a JSON response matching:
/// `{"error":{"code":"SCREAMING_SNAKE","message":"human-readable"}}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound { code: &'static str, message: String },
    BadRequest { code: &'static str, message: String },
    ServiceUnavailable { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::ServiceUnavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                message,
            ),
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_body(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_produces_correct_json() {
        let err = ApiError::NotFound {
            code: "ZONE_NOT_FOUND",
            message: "zone 7 is not polled".to_string(),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "ZONE_NOT_FOUND");
        assert_eq!(body["error"]["message"], "zone 7 is not polled");
    }

    #[tokio::test]
    async fn bad_request_produces_correct_json() {
        let err = ApiError::BadRequest {
            code: "INVALID_LIMIT",
            message: "limit must be > 0".to_string(),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_LIMIT");
    }

    #[tokio::test]
    async fn service_unavailable_produces_correct_json() {
        let err = ApiError::ServiceUnavailable {
            message: "no conntrack zone is configured".to_string(),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }
}
