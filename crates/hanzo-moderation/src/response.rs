//! Completion guard

use crate::audit::AuditLogger;
use crate::classifier::PolicyClassifier;
use crate::error::Direction;
use crate::types::{ChatCompletion, ReplyOutcome, RequestContext, ViolationSignal};
use std::sync::Arc;
use std::time::Instant;

/// Checks a complete backend reply before it is released to the client.
///
/// Never fails: a reply without content, or a classifier error, lets the
/// reply through unchanged.
#[derive(Clone)]
pub struct ResponseGuard {
    classifier: Arc<dyn PolicyClassifier>,
    block_message: String,
    audit: AuditLogger,
}

impl ResponseGuard {
    pub fn new(
        classifier: Arc<dyn PolicyClassifier>,
        block_message: impl Into<String>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            classifier,
            block_message: block_message.into(),
            audit,
        }
    }

    pub fn inspect(&self, reply: ChatCompletion, context: &RequestContext) -> ReplyOutcome {
        let start = Instant::now();

        let content = reply
            .first_content()
            .map(|text| text.into_owned())
            .filter(|text| !text.trim().is_empty());
        let Some(content) = content else {
            return ReplyOutcome::Allow(reply);
        };

        match self.classifier.evaluate(&content) {
            Ok(Some(policy_match)) => {
                let signal = ViolationSignal::blocked(
                    Direction::Output,
                    self.block_message.clone(),
                    Some(policy_match),
                );
                self.audit
                    .log_blocked(context, &content, &signal, start.elapsed());
                ReplyOutcome::Suppress(signal)
            }
            Ok(None) => {
                self.audit
                    .log_passed(context, Direction::Output, &content, start.elapsed());
                ReplyOutcome::Allow(reply)
            }
            Err(e) => {
                self.audit
                    .log_anomaly(context, &format!("output classification failed: {}", e));
                ReplyOutcome::Allow(reply)
            }
        }
    }
}
