//! Upstream HTTP client.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::Client;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Error as EventSourceError, Event as SseEvent, EventSource, retry};
use serde_json::{Value, json};
use tracing::{debug, warn};

use cortex_relay_protocol::{ChatMessage, StreamEvent, upstream_messages};

use super::error::{UpstreamError, UpstreamResult};
use crate::config::UpstreamConfig;

/// Parsed events of a streaming `:run` response.
pub type UpstreamEvents = BoxStream<'static, UpstreamResult<StreamEvent>>;

/// Client for the upstream agent service.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Build a client with the configured connect and total timeouts.
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Request body for a run: system prompt plus the tail of the dialogue.
    pub fn request_body(&self, history: &[ChatMessage]) -> Value {
        json!({
            "messages": upstream_messages(
                &self.config.system_prompt,
                history,
                self.config.max_turns,
            ),
        })
    }

    /// Start a streaming run against `agent`.
    ///
    /// Resolves once the stream is open. A non-success status is read to
    /// completion and returned as [`UpstreamError::Status`]. Nothing is
    /// retried: the first failure ends the stream.
    pub async fn run(&self, agent: &str, history: &[ChatMessage]) -> UpstreamResult<UpstreamEvents> {
        let url = self.config.run_url(agent);
        debug!(agent, turns = history.len(), "opening upstream stream");

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .header(ACCEPT, "text/event-stream")
            .json(&self.request_body(history));
        let mut es = EventSource::new(request).map_err(|e| UpstreamError::Client(e.to_string()))?;
        es.set_retry_policy(Box::new(retry::Never));

        let first = match es.next().await {
            Some(Ok(SseEvent::Open)) | Some(Err(EventSourceError::StreamEnded)) | None => None,
            Some(Ok(SseEvent::Message(msg))) => StreamEvent::from_sse(&msg.event, &msg.data).map(Ok),
            Some(Err(err)) => {
                es.close();
                return Err(self.open_error(agent, err).await);
            }
        };

        let events = es.filter_map(|item| async move {
            match item {
                Ok(SseEvent::Open) | Err(EventSourceError::StreamEnded) => None,
                Ok(SseEvent::Message(msg)) => StreamEvent::from_sse(&msg.event, &msg.data).map(Ok),
                Err(err) => Some(Err(UpstreamError::from(err))),
            }
        });
        Ok(stream::iter(first).chain(events).boxed())
    }

    async fn open_error(&self, agent: &str, err: EventSourceError) -> UpstreamError {
        match err {
            EventSourceError::InvalidStatusCode(status, response) => {
                let body = response.text().await.unwrap_or_default();
                warn!(agent, status = status.as_u16(), "upstream rejected run");
                UpstreamError::Status {
                    status: status.as_u16(),
                    body: truncate_chars(&body, self.config.error_body_limit),
                }
            }
            other => UpstreamError::from(other),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_system_prompt_and_recent_turns() {
        let mut config = UpstreamConfig::default();
        config.system_prompt = "Réponds en français.".into();
        config.max_turns = 2;
        let client = UpstreamClient::new(&config).unwrap();

        let history = vec![
            ChatMessage::user("un"),
            ChatMessage::assistant("deux"),
            ChatMessage::user("trois"),
        ];
        let body = client.request_body(&history);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"][0]["text"], "Réponds en français.");
        assert_eq!(messages[1]["content"][0]["text"], "deux");
        assert_eq!(messages[2]["role"], "user");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("éèàü", 2), "éè");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
