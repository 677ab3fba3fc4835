//! Chat message types.
//!
//! A conversation is an ordered list of [`ChatMessage`]s; insertion order is
//! conversation order. Requests only ever carry a tail of that history, the
//! UI keeps the full record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any role the relay does not forward upstream.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Whether messages with this role are part of the forwarded dialogue.
    pub fn is_dialogue(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
}

/// Accept any JSON value as message content: `null` reads as empty, other
/// non-string values as their JSON text.
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Render in the upstream agent's content-block shape.
    pub fn to_upstream(&self) -> Value {
        json!({
            "role": self.role.to_string(),
            "content": [{"type": "text", "text": self.content}],
        })
    }
}

/// The last `n` messages of `history`, oldest first.
pub fn last_turns(history: &[ChatMessage], n: usize) -> &[ChatMessage] {
    &history[history.len().saturating_sub(n)..]
}

/// Build the upstream `messages` array: the system prompt followed by the
/// last `max_turns` user/assistant messages. Other roles are dropped before
/// truncation.
pub fn upstream_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    max_turns: usize,
) -> Vec<Value> {
    let dialogue: Vec<&ChatMessage> = history.iter().filter(|m| m.role.is_dialogue()).collect();
    let start = dialogue.len().saturating_sub(max_turns);

    let mut messages = Vec::with_capacity(dialogue.len() - start + 1);
    messages.push(ChatMessage::system(system_prompt).to_upstream());
    messages.extend(dialogue[start..].iter().map(|m| m.to_upstream()));
    messages
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Upstream agent identifier; must be allow-listed by the relay.
    pub agent: String,
    pub messages: Vec<ChatMessage>,
    /// Forward suppressed thinking/status text on the `reasoning` channel.
    #[serde(default)]
    pub debug_reasoning: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub db: String,
    pub schema: String,
    pub allowed_agents: Vec<String>,
}
