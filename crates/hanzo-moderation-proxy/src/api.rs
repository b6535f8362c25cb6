//! Wire types shared by the gateway and the relay

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hanzo_moderation::envelope::EVENT_STREAM_CONTENT_TYPE;
use serde::{Deserialize, Serialize};

pub const POLICY_VIOLATION_TYPE: &str = "policy_violation";
pub const POLICY_VIOLATION_CODE: &str = "content_policy_violation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

impl HealthResponse {
    pub fn ok(service: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
        }
    }
}

/// OpenAI-style error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(
        message: impl Into<String>,
        r#type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: r#type.into(),
                code: code.into(),
            },
        }
    }

    /// The rejection body the relay knows how to translate
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::new(message, POLICY_VIOLATION_TYPE, POLICY_VIOLATION_CODE)
    }

    pub fn proxy_error(detail: impl std::fmt::Display) -> Self {
        Self::new(
            format!("Proxy error: {}", detail),
            "proxy_error",
            "upstream_unreachable",
        )
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(detail.to_string(), "server_error", "internal_error")
    }
}

pub fn error_response(status: StatusCode, error: ErrorResponse) -> Response {
    (status, Json(error)).into_response()
}

/// A complete SSE body served at 200
pub fn event_stream_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
