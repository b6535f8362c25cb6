//! Streaming coordination
//!
//! A streamed reply reaches the client piece by piece, before a complete
//! reply exists to inspect. Streaming requests are therefore sent to the
//! backend as plain requests; the client's original intent is kept as a
//! request annotation and decides the shape of the delivered reply.

use crate::backend::ChatBackend;
use crate::error::Result;
use crate::response::ResponseGuard;
use crate::types::{
    ChatCompletion, ChatRequest, ReplyOutcome, RequestContext, UpstreamReply, ViolationSignal,
    ORIGINAL_STREAM_REQUEST, STASHED_STREAM_OPTIONS,
};
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Turn off streaming, recording the original request under
/// `original_stream_request`. Returns `true` if the request was changed.
///
/// `stream_options` is only accepted on streaming requests, so it is moved
/// into the annotations as well.
pub fn suppress_streaming(request: &mut ChatRequest) -> bool {
    if !request.stream_requested() {
        return false;
    }

    request.stream = Some(false);
    request
        .annotations
        .insert(ORIGINAL_STREAM_REQUEST.to_string(), Value::Bool(true));
    if let Some(options) = request.extra.remove("stream_options") {
        request
            .annotations
            .insert(STASHED_STREAM_OPTIONS.to_string(), options);
    }
    true
}

/// What the coordinator hands back for one backend call
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatedReply {
    /// An approved completion, to be delivered streamed or not
    Deliver {
        completion: ChatCompletion,
        stream: bool,
    },
    /// The completion violated the policy
    Suppressed(ViolationSignal),
    /// Upstream error or a body that is not a completion; relay it as-is
    Passthrough(UpstreamReply),
}

/// Runs the backend call in non-streaming mode and guards the full reply
pub struct StreamingCoordinator<B> {
    backend: B,
    response_guard: ResponseGuard,
}

impl<B: ChatBackend> StreamingCoordinator<B> {
    pub fn new(backend: B, response_guard: ResponseGuard) -> Self {
        Self {
            backend,
            response_guard,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Call the backend once and decide what reaches the client.
    ///
    /// Only transport failures are errors.
    pub async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<CoordinatedReply> {
        let request = if request.stream_requested() {
            let mut request = request.clone();
            suppress_streaming(&mut request);
            Cow::Owned(request)
        } else {
            Cow::Borrowed(request)
        };

        let reply = self.backend.complete(&request).await?;

        if !reply.is_success() {
            debug!(
                request_id = %context.request_id,
                status = reply.status,
                "Relaying upstream error unchanged"
            );
            return Ok(CoordinatedReply::Passthrough(reply));
        }

        let completion: ChatCompletion = match serde_json::from_slice(&reply.body) {
            Ok(completion) => completion,
            Err(e) => {
                warn!(
                    request_id = %context.request_id,
                    error = %e,
                    "Backend reply is not a chat completion, passing through"
                );
                return Ok(CoordinatedReply::Passthrough(reply));
            }
        };

        match self.response_guard.inspect(completion, context) {
            ReplyOutcome::Allow(completion) => Ok(CoordinatedReply::Deliver {
                completion,
                stream: request.original_stream_request(),
            }),
            ReplyOutcome::Suppress(signal) => Ok(CoordinatedReply::Suppressed(signal)),
        }
    }
}
