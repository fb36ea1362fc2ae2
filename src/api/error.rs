use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::DomainError;

/// JSON error body shared by plain responses and SSE `error` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_body: Option<String>,
}

impl From<&DomainError> for ErrorBody {
    fn from(err: &DomainError) -> Self {
        let (upstream_status, upstream_body) = match err {
            DomainError::UpstreamError { status, body } => (Some(*status), Some(body.clone())),
            _ => (None, None),
        };
        Self {
            error: err.kind(),
            message: err.to_string(),
            upstream_status,
            upstream_body,
        }
    }
}

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::ContextServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::UpstreamUnavailable(_)
            | DomainError::UpstreamError { .. }
            | DomainError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DomainError::Storage(_) | DomainError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), "request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), "request rejected");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DomainError::invalid("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::context_unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::unavailable("x"), StatusCode::BAD_GATEWAY),
            (DomainError::upstream(429, "x"), StatusCode::BAD_GATEWAY),
            (DomainError::protocol("x"), StatusCode::BAD_GATEWAY),
            (DomainError::timeout("x"), StatusCode::GATEWAY_TIMEOUT),
            (DomainError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (DomainError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_upstream_error_body_carries_detail() {
        let body = serde_json::to_value(ErrorBody::from(&DomainError::upstream(429, "slow down")))
            .unwrap();
        assert_eq!(body["error"], "upstream_error");
        assert_eq!(body["upstream_status"], 429);
        assert_eq!(body["upstream_body"], "slow down");

        let body = serde_json::to_value(ErrorBody::from(&DomainError::timeout("late"))).unwrap();
        assert!(body.get("upstream_status").is_none());
    }
}
