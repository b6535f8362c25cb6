//! Inbound request guard

use crate::audit::AuditLogger;
use crate::classifier::PolicyClassifier;
use crate::error::{Direction, Result};
use crate::sanitizer::HistorySanitizer;
use crate::streaming::suppress_streaming;
use crate::types::{ChatRequest, PreflightOutcome, RequestContext, ViolationSignal};
use std::sync::Arc;
use std::time::Instant;

/// Checks a request before it reaches the backend.
///
/// Order matters:
/// 1. The most recent user turn is checked first. A match rejects the
///    request outright and history is left alone.
/// 2. The history is sanitized (fail open).
/// 3. Streaming is turned off so the reply can be inspected whole.
#[derive(Clone)]
pub struct PreflightGuard {
    classifier: Arc<dyn PolicyClassifier>,
    sanitizer: HistorySanitizer,
    block_message: String,
    audit: AuditLogger,
}

impl PreflightGuard {
    pub fn new(
        classifier: Arc<dyn PolicyClassifier>,
        block_message: impl Into<String>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            sanitizer: HistorySanitizer::new(classifier.clone()),
            classifier,
            block_message: block_message.into(),
            audit,
        }
    }

    /// Decide whether to reject the request or forward a rewritten copy.
    ///
    /// Classifier failures on the latest user turn are returned as errors:
    /// that check never fails open.
    pub fn preflight(
        &self,
        mut request: ChatRequest,
        context: &RequestContext,
    ) -> Result<PreflightOutcome> {
        let start = Instant::now();

        if let Some(turn) = request.messages.last_user_turn() {
            let text = turn.text();
            if let Some(policy_match) = self.classifier.evaluate(&text)? {
                let signal = ViolationSignal::blocked(
                    Direction::Input,
                    self.block_message.clone(),
                    Some(policy_match),
                );
                self.audit.log_blocked(context, &text, &signal, start.elapsed());
                return Ok(PreflightOutcome::Reject(signal));
            }
            self.audit
                .log_passed(context, Direction::Input, &text, start.elapsed());
        }

        let before = request.messages.len();
        let sanitized = self.sanitizer.sanitize_with_report(&request.messages);
        if sanitized.report.changed() {
            self.audit.log_sanitized(
                context,
                before,
                sanitized.conversation.len(),
                &sanitized.report,
            );
            request.messages = sanitized.conversation;
        } else if sanitized.report.fell_back {
            self.audit
                .log_anomaly(context, "history sanitation fell back to original conversation");
        }

        if suppress_streaming(&mut request) {
            self.audit.log_stream_forced(context);
        }

        Ok(PreflightOutcome::Forward(request))
    }
}
