//! HTTP backend for OpenAI-compatible model servers

use async_trait::async_trait;
use hanzo_moderation::{ChatBackend, ChatRequest, ModerationError, Result, UpstreamReply};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Resolve the chat-completions endpoint for a base URL, with or without
/// a trailing `/v1`
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

/// Posts chat requests to an upstream server and returns its reply verbatim
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModerationError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: chat_completions_url(base_url),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport(e: reqwest::Error) -> ModerationError {
    ModerationError::Transport(e.to_string())
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<UpstreamReply> {
        debug!(endpoint = %self.endpoint, model = %request.model, "Forwarding to upstream");

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport)?.to_vec();

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}
