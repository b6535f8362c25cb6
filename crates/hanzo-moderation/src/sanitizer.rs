//! Conversation history sanitation
//!
//! Removes policy-violating turns from the history a client resends with
//! every request, then repairs the alternation invariant the removal may
//! have broken.

use crate::classifier::PolicyClassifier;
use crate::error::Result;
use crate::types::{Conversation, Role, Turn};
use std::sync::Arc;
use tracing::warn;

/// What a sanitation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Flagged user turns removed together with the reply after them
    pub removed_pairs: usize,
    /// Reply turns (assistant, tool, function) removed along with a flagged
    /// user turn or an orphan assistant turn
    pub removed_replies: usize,
    /// Flagged user turns removed on their own
    pub removed_user_turns: usize,
    /// Flagged assistant turns with no flagged user turn before them
    pub orphans: usize,
    /// Non-user turns removed from the start of the dialogue
    pub leading_stripped: usize,
    /// Turns replaced while collapsing same-role runs
    pub collapsed: usize,
    /// Sanitation produced nothing usable and the original was kept
    pub fell_back: bool,
}

impl SanitizeReport {
    /// True when the returned conversation differs from the input
    pub fn changed(&self) -> bool {
        !self.fell_back
            && (self.removed_pairs
                + self.removed_replies
                + self.removed_user_turns
                + self.orphans
                + self.leading_stripped
                + self.collapsed)
                > 0
    }
}

/// Result of a sanitation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub conversation: Conversation,
    pub report: SanitizeReport,
}

/// Rewrites a conversation into a policy-compliant, alternating one
#[derive(Clone)]
pub struct HistorySanitizer {
    classifier: Arc<dyn PolicyClassifier>,
}

impl HistorySanitizer {
    pub fn new(classifier: Arc<dyn PolicyClassifier>) -> Self {
        Self { classifier }
    }

    /// Sanitize a conversation, returning the original when sanitation
    /// would leave nothing or fails.
    pub fn sanitize(&self, conversation: &Conversation) -> Conversation {
        self.sanitize_with_report(conversation).conversation
    }

    /// Like [`sanitize`](Self::sanitize), also reporting what changed
    pub fn sanitize_with_report(&self, conversation: &Conversation) -> Sanitized {
        match self.repair(conversation) {
            Ok(Some(sanitized)) => sanitized,
            Ok(None) => Sanitized {
                conversation: conversation.clone(),
                report: SanitizeReport::default(),
            },
            Err(e) => {
                warn!(error = %e, "History sanitation failed, keeping original conversation");
                Sanitized {
                    conversation: conversation.clone(),
                    report: SanitizeReport {
                        fell_back: true,
                        ..Default::default()
                    },
                }
            }
        }
    }

    /// `Ok(None)` when there is no history to repair
    fn repair(&self, conversation: &Conversation) -> Result<Option<Sanitized>> {
        let prefix_len = conversation.instruction_prefix_len();
        let (prefix, dialogue) = conversation.turns().split_at(prefix_len);

        if dialogue.len() <= 1 {
            return Ok(None);
        }

        let mut report = SanitizeReport::default();
        let mut kept: Vec<Turn> = Vec::with_capacity(dialogue.len());

        // Step 1 and 2: drop flagged user turns with their reply, then orphans.
        // A reply runs up to the next user turn so tool results never outlive
        // the assistant turn that requested them.
        let mut i = 0;
        while i < dialogue.len() {
            let turn = &dialogue[i];
            let flagged = match turn.role() {
                Role::User | Role::Assistant => self.classifier.classify(&turn.text())?,
                _ => false,
            };

            match (flagged, turn.role()) {
                (true, Role::User) => {
                    let reply = reply_len(&dialogue[i + 1..], is_reply_role);
                    if reply > 0 {
                        report.removed_pairs += 1;
                        report.removed_replies += reply;
                    } else {
                        report.removed_user_turns += 1;
                    }
                    i += 1 + reply;
                }
                (true, _) => {
                    warn!(
                        position = prefix_len + i,
                        "Removing orphan assistant turn flagged by policy"
                    );
                    let tool_results = reply_len(&dialogue[i + 1..], is_tool_role);
                    report.orphans += 1;
                    report.removed_replies += tool_results;
                    i += 1 + tool_results;
                }
                (false, _) => {
                    kept.push(turn.clone());
                    i += 1;
                }
            }
        }

        // Step 3: the dialogue must open with the user
        let leading = kept
            .iter()
            .take_while(|turn| turn.role() != Role::User)
            .count();
        kept.drain(..leading);
        report.leading_stripped = leading;

        // Step 4: collapse same-role runs, keeping the latest turn
        let mut alternating: Vec<Turn> = Vec::with_capacity(kept.len());
        for turn in kept {
            match alternating.last_mut() {
                Some(last) if last.role() == turn.role() => {
                    *last = turn;
                    report.collapsed += 1;
                }
                _ => alternating.push(turn),
            }
        }

        // Step 5: an empty dialogue is unusable
        if alternating.is_empty() {
            warn!(
                turns = conversation.len(),
                "No turns left after sanitation, keeping original conversation"
            );
            report.fell_back = true;
            return Ok(Some(Sanitized {
                conversation: conversation.clone(),
                report,
            }));
        }

        if !report.changed() {
            return Ok(None);
        }

        let turns = prefix.iter().cloned().chain(alternating).collect();
        Ok(Some(Sanitized {
            conversation: turns,
            report,
        }))
    }
}

fn is_reply_role(role: Role) -> bool {
    matches!(role, Role::Assistant | Role::Tool | Role::Function)
}

fn is_tool_role(role: Role) -> bool {
    matches!(role, Role::Tool | Role::Function)
}

/// Length of the leading run of `turns` whose role satisfies `belongs`
fn reply_len(turns: &[Turn], belongs: fn(Role) -> bool) -> usize {
    turns.iter().take_while(|turn| belongs(turn.role())).count()
}
