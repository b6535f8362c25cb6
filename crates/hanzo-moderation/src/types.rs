//! Core types for Hanzo Moderation
//!
//! These mirror the OpenAI chat-completion wire shapes closely enough to
//! round-trip them: fields the pipeline does not care about are kept in
//! flattened `extra` maps and forwarded untouched.

use crate::error::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Annotation key recording that the client asked for a streamed reply
pub const ORIGINAL_STREAM_REQUEST: &str = "original_stream_request";

/// Annotation key holding `stream_options` removed while streaming is suppressed
pub const STASHED_STREAM_OPTIONS: &str = "stream_options";

/// Speaker role of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
}

impl Role {
    /// Instruction roles form the conversation prefix and are never sanitized
    pub fn is_instruction(&self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Developer => write!(f, "developer"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
            Role::Function => write!(f, "function"),
        }
    }
}

/// Message content: a plain string or an array of typed content parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl MessageContent {
    /// Textual view of the content. Non-text parts (images, audio) are skipped.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                Cow::Owned(texts.join("\n"))
            }
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

/// One message in a conversation
///
/// Turns are immutable; sanitation replaces or drops whole turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&MessageContent> {
        self.content.as_ref()
    }

    /// Text of the turn, empty when the content is null
    pub fn text(&self) -> Cow<'_, str> {
        match &self.content {
            Some(content) => content.text(),
            None => Cow::Borrowed(""),
        }
    }

    /// Wire fields other than `role` and `content` (`name`, `tool_calls`, ...)
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// Ordered conversation history. Order is the LLM context and is preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Turn>);

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self(turns)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recent user turn, which decides whether a request is rejected
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.0.iter().rev().find(|turn| turn.role == Role::User)
    }

    /// Number of leading system/developer turns
    pub fn instruction_prefix_len(&self) -> usize {
        self.0
            .iter()
            .take_while(|turn| turn.role.is_instruction())
            .count()
    }

    /// True when the dialogue after the instruction prefix is non-empty,
    /// starts with a user turn and never repeats a role back to back.
    pub fn is_alternating(&self) -> bool {
        let dialogue = &self.0[self.instruction_prefix_len()..];
        match dialogue.first() {
            Some(first) if first.role == Role::User => dialogue
                .windows(2)
                .all(|pair| pair[0].role != pair[1].role),
            _ => false,
        }
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

impl FromIterator<Turn> for Conversation {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inbound chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Conversation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Remaining request fields (`max_tokens`, `temperature`, ...), forwarded as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Request-scoped annotations. Never serialized, never forwarded.
    #[serde(skip)]
    pub annotations: BTreeMap<String, Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: impl Into<Conversation>) -> Self {
        Self {
            model: model.into(),
            messages: messages.into(),
            stream: None,
            extra: Map::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Whether the request, as it stands now, asks for a streamed reply
    pub fn stream_requested(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Whether the client originally asked for a streamed reply, even if
    /// streaming has since been suppressed
    pub fn original_stream_request(&self) -> bool {
        self.annotations
            .get(ORIGINAL_STREAM_REQUEST)
            .and_then(Value::as_bool)
            .unwrap_or_else(|| self.stream_requested())
    }
}

/// Completed (non-streamed) chat completion returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default = "completion_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn completion_object() -> String {
    "chat.completion".to_string()
}

impl ChatCompletion {
    /// Content of the single policed completion channel
    pub fn first_content(&self) -> Option<Cow<'_, str>> {
        self.choices
            .first()?
            .message
            .as_ref()?
            .content
            .as_ref()
            .map(MessageContent::text)
    }

    /// Finish reason of the first choice, `stop` when the backend left it out
    pub fn first_finish_reason(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
            .unwrap_or("stop")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn assistant_role() -> String {
    Role::Assistant.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Detail of a policy match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMatch {
    /// Source of the pattern that matched
    pub pattern: String,
    /// Matched text
    pub matched: String,
    /// Byte offset of the match
    pub position: usize,
}

/// A block decision, alive for the duration of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSignal {
    pub blocked: bool,
    /// Message shown to the client in place of a completion
    pub message: String,
    pub direction: Direction,
    pub policy_match: Option<PolicyMatch>,
}

impl ViolationSignal {
    pub fn blocked(
        direction: Direction,
        message: impl Into<String>,
        policy_match: Option<PolicyMatch>,
    ) -> Self {
        Self {
            blocked: true,
            message: message.into(),
            direction,
            policy_match,
        }
    }
}

/// Outcome of [`PreflightGuard::preflight`](crate::preflight::PreflightGuard::preflight)
#[derive(Debug, Clone, PartialEq)]
pub enum PreflightOutcome {
    /// Send the (possibly rewritten) request to the backend
    Forward(ChatRequest),
    /// Answer with a block message; the backend is never called
    Reject(ViolationSignal),
}

impl PreflightOutcome {
    pub fn is_reject(&self) -> bool {
        matches!(self, PreflightOutcome::Reject(_))
    }
}

/// Outcome of [`ResponseGuard::inspect`](crate::response::ResponseGuard::inspect)
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Allow(ChatCompletion),
    Suppress(ViolationSignal),
}

impl ReplyOutcome {
    pub fn is_suppress(&self) -> bool {
        matches!(self, ReplyOutcome::Suppress(_))
    }
}

/// Raw backend answer, used where the body is relayed rather than policed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-request context carried through the pipeline for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request ID
    pub request_id: Uuid,
    /// Model named by the client
    pub model: Option<String>,
    /// Time the request was received
    pub received_at: DateTime<Utc>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            model: None,
            received_at: Utc::now(),
        }
    }
}

impl RequestContext {
    /// Create a new context with a fresh request ID
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
