//! Stream event types.
//!
//! [`StreamEvent`] is one inbound SSE event as read from a feed.
//! [`RelayEvent`] is what the relay writes to its own clients.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// One inbound event: the SSE `event:` name and the parsed `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Lowercased event name; `message` or empty when the feed did not name
    /// the event.
    pub kind: String,
    pub payload: Value,
}

impl StreamEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Build an event from a dispatched SSE message.
    ///
    /// Empty data becomes `{}`. Data that is not JSON is skipped.
    pub fn from_sse(name: &str, data: &str) -> Option<Self> {
        let kind = name.trim().to_lowercase();
        let data = data.trim();
        if data.is_empty() {
            return Some(Self::new(kind, json!({})));
        }
        match serde_json::from_str::<Value>(data) {
            Ok(payload) => Some(Self::new(kind, payload)),
            Err(err) => {
                debug!(kind = %kind, error = %err, "skipping malformed event payload");
                None
            }
        }
    }
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// The upstream answered with a non-success status.
    Status { status: u16, body: String },
    /// The exchange failed before or while streaming.
    Exception { exception: String },
}

impl ErrorPayload {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            exception: message.into(),
        }
    }

    /// Interpret an arbitrary `error` payload, keeping unknown shapes as
    /// their JSON text.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone())
            .unwrap_or_else(|_| Self::exception(value.to_string()))
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "upstream returned {status}: {body}"),
            Self::Exception { exception } => write!(f, "{exception}"),
        }
    }
}

/// Event written on the relay's outbound SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// One reconciled text increment.
    Delta(String),
    /// Full text superseding everything sent so far. Sent as a `delta`
    /// flagged with `"replace": true`.
    Replace(String),
    /// Suppressed thinking/status text, only sent in debug mode.
    Reasoning(String),
    Error(ErrorPayload),
    /// Clean end of stream.
    Done,
}

impl RelayEvent {
    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delta(_) | Self::Replace(_) => "delta",
            Self::Reasoning(_) => "reasoning",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> Value {
        match self {
            Self::Delta(text) | Self::Reasoning(text) => json!({ "text": text }),
            Self::Replace(text) => json!({ "text": text, "replace": true }),
            Self::Error(payload) => serde_json::to_value(payload).unwrap_or(Value::Null),
            Self::Done => json!({}),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }

    /// Render as a complete SSE frame.
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_wire_format() {
        assert_eq!(
            RelayEvent::Delta("Bonjour".into()).to_frame(),
            "event: delta\ndata: {\"text\":\"Bonjour\"}\n\n"
        );
        assert_eq!(RelayEvent::Done.to_frame(), "event: done\ndata: {}\n\n");
    }

    #[test]
    fn replace_is_a_flagged_delta() {
        let replace = RelayEvent::Replace("Total: 42".into());
        assert_eq!(replace.name(), "delta");
        assert_eq!(replace.data(), json!({"text": "Total: 42", "replace": true}));
        assert!(!replace.is_terminal());
    }

    #[test]
    fn sse_messages_become_stream_events() {
        assert_eq!(
            StreamEvent::from_sse("Response.Text.Delta", r#"{"text":"Bon"}"#),
            Some(StreamEvent::new("response.text.delta", json!({"text": "Bon"})))
        );
        assert_eq!(
            StreamEvent::from_sse("done", ""),
            Some(StreamEvent::new("done", json!({})))
        );
        assert_eq!(StreamEvent::from_sse("delta", "not json"), None);
    }

    #[test]
    fn error_payload_shapes() {
        let status = RelayEvent::Error(ErrorPayload::Status {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(status.data(), json!({"status": 503, "body": "busy"}));

        let exception = RelayEvent::Error(ErrorPayload::exception("timed out"));
        assert_eq!(exception.data(), json!({"exception": "timed out"}));
        assert!(exception.is_terminal());
    }

    #[test]
    fn error_payload_from_arbitrary_value() {
        assert_eq!(
            ErrorPayload::from_value(&json!({"status": 401, "body": "denied"})),
            ErrorPayload::Status {
                status: 401,
                body: "denied".into()
            }
        );
        assert_eq!(
            ErrorPayload::from_value(&json!({"code": "X"})),
            ErrorPayload::exception(r#"{"code":"X"}"#)
        );
    }
}
