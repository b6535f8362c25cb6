//! Status-translating reverse proxy
//!
//! Chat clients treat a 4xx from the completion endpoint as a failed turn
//! and often corrupt their local history. The relay forwards every request
//! to the moderated backend and answers a policy block with a normal 200
//! completion carrying the block message, shaped to match the client's
//! `stream` flag. Everything else passes through.

use crate::api::{error_response, event_stream_response, ErrorResponse, HealthResponse};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hanzo_moderation::envelope::{message_completion, message_event_stream};
use hanzo_moderation::{ModerationError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const SERVICE_NAME: &str = "hanzo-moderation-relay";

/// Message used when a block body does not carry one
pub const DEFAULT_BLOCK_MESSAGE: &str = "Request blocked by content policy";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Headers that describe one connection, plus the ones the client library
/// recomputes, are never copied across the relay
fn is_connection_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base URL of the moderated backend
    pub backend_url: String,
    /// Status the backend uses for a policy block
    pub block_status: StatusCode,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            block_status: StatusCode::BAD_REQUEST,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_block_status(mut self, block_status: StatusCode) -> Self {
        self.block_status = block_status;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What the relay needs to know about the request body. Read leniently;
/// the body itself is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHints {
    pub model: String,
    pub stream: bool,
}

impl RequestHints {
    pub fn from_body(body: &[u8]) -> Self {
        let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        Self {
            model: value
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            stream: value
                .get("stream")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Pull the human-readable message out of a block body.
///
/// Accepts `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"detail": "..."}`.
pub fn block_message(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return DEFAULT_BLOCK_MESSAGE.to_string();
    };

    let message = match value.get("error") {
        Some(Value::String(message)) => Some(message.as_str()),
        Some(error) => error.get("message").and_then(Value::as_str),
        None => None,
    }
    .or_else(|| value.get("detail").and_then(Value::as_str));

    message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or(DEFAULT_BLOCK_MESSAGE)
        .to_string()
}

/// A 200 completion carrying `message`, as JSON or as an event stream
pub fn translated_response(message: &str, hints: &RequestHints) -> Response {
    if hints.stream {
        match message_event_stream(message, &hints.model) {
            Ok(body) => event_stream_response(body),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal(e)),
        }
    } else {
        (StatusCode::OK, Json(message_completion(message, &hints.model))).into_response()
    }
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if !is_connection_header(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn proxy_error(e: impl std::fmt::Display) -> Response {
    error_response(StatusCode::BAD_GATEWAY, ErrorResponse::proxy_error(e))
}

/// Reverse proxy in front of the moderated backend
#[derive(Clone)]
pub struct StatusTranslator {
    client: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl StatusTranslator {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModerationError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// `/health` is answered locally; every other path is relayed.
    /// Body size is left to the backend.
    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .fallback(relay_handler)
            .layer(DefaultBodyLimit::disable())
            .with_state(self)
    }

    fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!(
            "{}{}",
            self.config.backend_url.trim_end_matches('/'),
            path_and_query
        )
    }

    /// Forward one request and translate the answer
    pub async fn relay(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let hints = RequestHints::from_body(&body);
        let url = self.target_url(&uri);

        let mut outbound = HeaderMap::new();
        copy_headers(&headers, &mut outbound);

        let upstream = match self
            .client
            .request(method.clone(), &url)
            .headers(outbound)
            .body(body)
            .send()
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(method = %method, url = %url, error = %e, "Backend unreachable");
                return proxy_error(e);
            }
        };

        let status = upstream.status();

        if status == self.config.block_status {
            let body = match upstream.bytes().await {
                Ok(body) => body,
                Err(e) => return proxy_error(e),
            };
            let message = block_message(&body);
            info!(
                model = %hints.model,
                stream = hints.stream,
                message = %message,
                "Translating policy block into assistant message"
            );
            return translated_response(&message, &hints);
        }

        let mut response_headers = HeaderMap::new();
        copy_headers(upstream.headers(), &mut response_headers);

        let body = if hints.stream && status.is_success() {
            debug!(url = %url, "Relaying event stream");
            Body::from_stream(upstream.bytes_stream())
        } else {
            match upstream.bytes().await {
                Ok(body) => Body::from(body),
                Err(e) => return proxy_error(e),
            }
        };

        debug!(method = %method, url = %url, status = status.as_u16(), "Relayed");

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        response
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok(SERVICE_NAME))
}

async fn relay_handler(
    State(translator): State<StatusTranslator>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    translator.relay(method, uri, headers, body).await
}
