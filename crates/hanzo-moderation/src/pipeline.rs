//! Request dispatcher tying the guards together

use crate::audit::AuditLogger;
use crate::backend::ChatBackend;
use crate::classifier::{PatternClassifier, PolicyClassifier};
use crate::config::ModerationConfig;
use crate::error::Result;
use crate::preflight::PreflightGuard;
use crate::response::ResponseGuard;
use crate::streaming::{CoordinatedReply, StreamingCoordinator};
use crate::types::{
    ChatCompletion, ChatRequest, PreflightOutcome, RequestContext, UpstreamReply, ViolationSignal,
};
use std::sync::Arc;

/// Final outcome of one moderated request
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The latest user turn violated the policy; the backend was not called
    Rejected(ViolationSignal),
    /// The completion violated the policy
    Suppressed(ViolationSignal),
    /// An approved completion, to be delivered streamed or not
    Completed {
        completion: ChatCompletion,
        stream: bool,
    },
    /// Upstream error or unrecognised body, relayed unchanged
    Passthrough(UpstreamReply),
}

impl PipelineOutcome {
    /// The block signal, if the request was blocked on either side
    pub fn violation(&self) -> Option<&ViolationSignal> {
        match self {
            PipelineOutcome::Rejected(signal) | PipelineOutcome::Suppressed(signal) => Some(signal),
            _ => None,
        }
    }
}

/// Preflight guard, backend call and response guard, in that order
pub struct ModerationPipeline<B> {
    preflight: PreflightGuard,
    coordinator: StreamingCoordinator<B>,
}

impl<B: ChatBackend> ModerationPipeline<B> {
    /// Build a pipeline using the configured blocklist
    pub fn new(config: &ModerationConfig, backend: B) -> Result<Self> {
        let classifier = PatternClassifier::new(&config.policy)?;
        Ok(Self::with_classifier(config, Arc::new(classifier), backend))
    }

    /// Build a pipeline around any classifier
    pub fn with_classifier(
        config: &ModerationConfig,
        classifier: Arc<dyn PolicyClassifier>,
        backend: B,
    ) -> Self {
        let audit = AuditLogger::new(config.audit.clone());
        let preflight = PreflightGuard::new(
            classifier.clone(),
            config.policy.input_block_message.clone(),
            audit.clone(),
        );
        let response_guard =
            ResponseGuard::new(classifier, config.policy.output_block_message.clone(), audit);

        Self {
            preflight,
            coordinator: StreamingCoordinator::new(backend, response_guard),
        }
    }

    pub fn backend(&self) -> &B {
        self.coordinator.backend()
    }

    /// Moderate one request end to end.
    ///
    /// Errors are limited to a failed latest-turn classification and
    /// transport failures reaching the backend.
    pub async fn handle(
        &self,
        request: ChatRequest,
        context: &RequestContext,
    ) -> Result<PipelineOutcome> {
        let request = match self.preflight.preflight(request, context)? {
            PreflightOutcome::Forward(request) => request,
            PreflightOutcome::Reject(signal) => return Ok(PipelineOutcome::Rejected(signal)),
        };

        let outcome = match self.coordinator.complete(&request, context).await? {
            CoordinatedReply::Deliver { completion, stream } => {
                PipelineOutcome::Completed { completion, stream }
            }
            CoordinatedReply::Suppressed(signal) => PipelineOutcome::Suppressed(signal),
            CoordinatedReply::Passthrough(reply) => PipelineOutcome::Passthrough(reply),
        };

        Ok(outcome)
    }
}
