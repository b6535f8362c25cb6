//! Moderated chat-completions gateway
//!
//! Runs every request through the [`ModerationPipeline`] and answers with
//! the OpenAI wire shapes. Blocks on either side come back as a 400
//! policy-violation error, which the relay turns into an assistant message.

use crate::api::{
    error_response, event_stream_response, ErrorResponse, HealthResponse,
};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hanzo_moderation::envelope::completion_event_stream;
use hanzo_moderation::{
    ChatBackend, ChatRequest, ModerationError, ModerationPipeline, PipelineOutcome,
    RequestContext, UpstreamReply,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "hanzo-moderation-gateway";

/// Build the gateway router around a pipeline
pub fn gateway_router<B>(pipeline: ModerationPipeline<B>) -> Router
where
    B: ChatBackend + 'static,
{
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(chat_completions_handler::<B>))
        .route("/chat/completions", post(chat_completions_handler::<B>))
        // Multimodal payloads routinely exceed axum's 2 MB default
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(pipeline))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok(SERVICE_NAME))
}

async fn chat_completions_handler<B>(
    State(pipeline): State<Arc<ModerationPipeline<B>>>,
    body: Bytes,
) -> Response
where
    B: ChatBackend + 'static,
{
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed chat request");
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(
                    format!("Invalid request body: {}", e),
                    "invalid_request_error",
                    "invalid_request",
                ),
            );
        }
    };

    let context = RequestContext::new().with_model(request.model.clone());
    info!(
        request_id = %context.request_id,
        model = %request.model,
        turns = request.messages.len(),
        stream = request.stream_requested(),
        "Processing chat completion"
    );

    match pipeline.handle(request, &context).await {
        Ok(outcome) => outcome_response(outcome),
        Err(ModerationError::Transport(detail)) => {
            error!(request_id = %context.request_id, error = %detail, "Upstream unreachable");
            error_response(StatusCode::BAD_GATEWAY, ErrorResponse::proxy_error(detail))
        }
        Err(e) => {
            error!(request_id = %context.request_id, error = %e, "Moderation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal(e))
        }
    }
}

/// Map a pipeline outcome onto the HTTP response the client sees
pub fn outcome_response(outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::Rejected(signal) | PipelineOutcome::Suppressed(signal) => {
            error_response(
                StatusCode::BAD_REQUEST,
                ErrorResponse::policy_violation(signal.message),
            )
        }
        PipelineOutcome::Completed {
            completion,
            stream: true,
        } => match completion_event_stream(&completion) {
            Ok(body) => event_stream_response(body),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal(e)),
        },
        PipelineOutcome::Completed {
            completion,
            stream: false,
        } => Json(completion).into_response(),
        PipelineOutcome::Passthrough(reply) => passthrough_response(reply),
    }
}

fn passthrough_response(reply: UpstreamReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = reply
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok());

    let mut response = (status, reply.body).into_response();
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}
