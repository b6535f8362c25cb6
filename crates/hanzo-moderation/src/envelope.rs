//! OpenAI-compatible response envelopes
//!
//! Builds the success-shaped bodies that carry a block message (or an
//! already-approved completion) back to a chat client, in both the plain JSON
//! and the server-sent-events shape.

use crate::error::Result;
use crate::types::{ChatCompletion, Choice, MessageContent, ResponseMessage, Role, Usage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

/// Content type of a streamed chat completion
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Payload of the final SSE frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// One `chat.completion.chunk` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fresh completion id
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

/// Unix timestamp for `created`
pub fn timestamp() -> i64 {
    Utc::now().timestamp()
}

/// A complete `chat.completion` whose only choice carries `message`
pub fn message_completion(message: &str, model: &str) -> ChatCompletion {
    ChatCompletion {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: Some(ResponseMessage {
                role: Role::Assistant.to_string(),
                content: Some(MessageContent::Text(message.to_string())),
                extra: Map::new(),
            }),
            finish_reason: Some("stop".to_string()),
            extra: Map::new(),
        }],
        usage: Some(Usage::default()),
        extra: Map::new(),
    }
}

/// A two-frame event stream carrying `message`, with a fresh id and timestamp
pub fn message_event_stream(message: &str, model: &str) -> Result<String> {
    event_stream(&completion_id(), timestamp(), model, message, "stop")
}

/// Re-emit an approved completion as an event stream, keeping its identity
pub fn completion_event_stream(completion: &ChatCompletion) -> Result<String> {
    let content = completion.first_content().unwrap_or_default();
    event_stream(
        &completion.id,
        completion.created,
        &completion.model,
        &content,
        completion.first_finish_reason(),
    )
}

/// Content frame, terminal frame, then the `[DONE]` sentinel
pub fn event_stream(
    id: &str,
    created: i64,
    model: &str,
    content: &str,
    finish_reason: &str,
) -> Result<String> {
    let chunk = |delta: Delta, finish_reason: Option<String>| ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };

    let content_frame = chunk(
        Delta {
            role: Some(Role::Assistant.to_string()),
            content: Some(content.to_string()),
        },
        None,
    );
    let finish_frame = chunk(Delta::default(), Some(finish_reason.to_string()));

    Ok(format!(
        "data: {}\n\ndata: {}\n\ndata: {}\n\n",
        serde_json::to_string(&content_frame)?,
        serde_json::to_string(&finish_frame)?,
        DONE_SENTINEL
    ))
}

/// Frames of a parsed event stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStream {
    pub chunks: Vec<ChatCompletionChunk>,
    /// The `[DONE]` sentinel was seen
    pub done: bool,
}

impl EventStream {
    /// Concatenated delta content of the first choice
    pub fn content(&self) -> String {
        self.chunks
            .iter()
            .filter_map(|chunk| chunk.choices.first())
            .filter_map(|choice| choice.delta.content.as_deref())
            .collect()
    }
}

/// Parse `data:` frames up to the `[DONE]` sentinel
pub fn parse_event_stream(body: &str) -> Result<EventStream> {
    let mut stream = EventStream::default();

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            stream.done = true;
            break;
        }
        stream.chunks.push(serde_json::from_str(data)?);
    }

    Ok(stream)
}
