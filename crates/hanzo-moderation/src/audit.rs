//! Audit logging for moderation decisions
//!
//! Every decision is emitted as a structured `tracing` record keyed by the
//! request ID. Content is represented by a hash unless `log_content` is set.

use crate::config::AuditConfig;
use crate::error::Direction;
use crate::sanitizer::SanitizeReport;
use crate::types::{RequestContext, ViolationSignal};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tracing::{info, warn};

/// Audit logger
#[derive(Debug, Clone)]
pub struct AuditLogger {
    config: AuditConfig,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Log a blocked prompt or suppressed completion
    pub fn log_blocked(
        &self,
        context: &RequestContext,
        content: &str,
        signal: &ViolationSignal,
        elapsed: Duration,
    ) {
        if !self.config.enabled {
            return;
        }

        let matched = signal.policy_match.as_ref().map(|m| m.pattern.as_str());
        let content_field = self.content_field(content);

        match signal.direction {
            Direction::Input => warn!(
                request_id = %context.request_id,
                model = ?context.model,
                direction = %signal.direction,
                content_hash = %hash_content(content),
                pattern = ?matched,
                content = ?content_field,
                elapsed_ms = elapsed.as_millis() as u64,
                "Prompt blocked by content policy"
            ),
            Direction::Output => warn!(
                request_id = %context.request_id,
                model = ?context.model,
                direction = %signal.direction,
                content_hash = %hash_content(content),
                pattern = ?matched,
                content = ?content_field,
                elapsed_ms = elapsed.as_millis() as u64,
                "Completion suppressed by content policy"
            ),
        }
    }

    /// Log content that passed a check
    pub fn log_passed(&self, context: &RequestContext, direction: Direction, content: &str, elapsed: Duration) {
        if !self.config.enabled {
            return;
        }

        info!(
            request_id = %context.request_id,
            direction = %direction,
            content_hash = %hash_content(content),
            content = ?self.content_field(content),
            elapsed_ms = elapsed.as_millis() as u64,
            "Content passed"
        );
    }

    /// Log a history rewrite
    pub fn log_sanitized(&self, context: &RequestContext, before: usize, after: usize, report: &SanitizeReport) {
        if !self.config.enabled {
            return;
        }

        info!(
            request_id = %context.request_id,
            before,
            after,
            removed_pairs = report.removed_pairs,
            removed_replies = report.removed_replies,
            removed_user_turns = report.removed_user_turns,
            orphans = report.orphans,
            leading_stripped = report.leading_stripped,
            collapsed = report.collapsed,
            "Conversation history sanitized"
        );
    }

    /// Log that streaming was turned off so the full reply can be inspected
    pub fn log_stream_forced(&self, context: &RequestContext) {
        if !self.config.enabled {
            return;
        }

        info!(
            request_id = %context.request_id,
            model = ?context.model,
            original_stream_request = true,
            "Streaming suppressed to enable output filtering"
        );
    }

    /// Log an anomaly that did not change the outcome
    pub fn log_anomaly(&self, context: &RequestContext, detail: &str) {
        warn!(request_id = %context.request_id, detail, "Moderation anomaly");
    }

    fn content_field(&self, content: &str) -> Option<String> {
        if self.config.log_content {
            Some(truncate(content, 200))
        } else {
            None
        }
    }
}

/// Hash content for audit (privacy-preserving)
fn hash_content(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Truncate string for logging, respecting char boundaries
fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
