//! Relay consumer.
//!
//! [`RelayClient`] talks to a running relay and folds its events into one
//! accumulated text through a consumer-policy [`StreamSession`]: deltas are
//! appended as sent and flagged replacements supersede the text.
//! [`Conversation`] keeps a separate history per agent.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest_eventsource::{Error as EventSourceError, Event as SseEvent, EventSource, retry};
use thiserror::Error;
use tracing::{debug, warn};

use cortex_relay_protocol::{
    AgentDescriptor, ChatMessage, ChatRequest, ErrorPayload, FilterPolicy, HealthResponse,
    SessionOutput, StreamEvent, StreamSession, last_turns,
};

use crate::api::API_KEY_HEADER;

/// Messages sent with each request.
pub const HISTORY_LIMIT: usize = 20;

/// Assistant turn recorded when a stream produced no text.
pub const NO_RESPONSE_PLACEHOLDER: &str = "_Aucune réponse._";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay refused the request.
    #[error("relay returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// The relay reported a failure in-band.
    #[error("stream error: {0}")]
    Stream(ErrorPayload),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The event stream could not be opened or read.
    #[error("event stream error: {0}")]
    EventStream(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Progress reported while a reply streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerUpdate {
    /// Full text accumulated so far.
    Text(String),
    /// Side-channel reasoning, only with debug enabled.
    Reasoning(String),
}

/// HTTP client for a relay instance.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Stream one reply from `agent` and return the accumulated text.
    ///
    /// `history` is truncated to the last [`HISTORY_LIMIT`] messages.
    /// `on_update` sees every change to the accumulated text.
    pub async fn stream_chat<F>(
        &self,
        agent: &str,
        history: &[ChatMessage],
        debug_reasoning: bool,
        mut on_update: F,
    ) -> ClientResult<String>
    where
        F: FnMut(ConsumerUpdate),
    {
        let request = ChatRequest {
            agent: agent.to_string(),
            messages: last_turns(history, HISTORY_LIMIT).to_vec(),
            debug_reasoning,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/stream", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let mut es =
            EventSource::new(builder).map_err(|e| ClientError::EventStream(e.to_string()))?;
        es.set_retry_policy(Box::new(retry::Never));
        let mut session = StreamSession::new(FilterPolicy::consumer(debug_reasoning));

        while let Some(item) = es.next().await {
            let message = match item {
                Ok(SseEvent::Open) => continue,
                Ok(SseEvent::Message(message)) => message,
                Err(EventSourceError::StreamEnded) => break,
                Err(err) => {
                    es.close();
                    return Err(stream_error(err).await);
                }
            };
            let Some(event) = StreamEvent::from_sse(&message.event, &message.data) else {
                continue;
            };
            if apply(&mut session, &event, &mut on_update)? {
                break;
            }
        }
        es.close();

        if !session.is_terminated() {
            debug!(agent, "relay stream ended without done");
        }
        Ok(session.text().to_string())
    }
}

/// Feed one event; `Ok(true)` once the stream has finished.
fn apply<F>(session: &mut StreamSession, event: &StreamEvent, on_update: &mut F) -> ClientResult<bool>
where
    F: FnMut(ConsumerUpdate),
{
    match session.push_event(event) {
        Some(SessionOutput::Delta(_)) => {
            on_update(ConsumerUpdate::Text(session.text().to_string()));
            Ok(false)
        }
        Some(SessionOutput::Reasoning(text)) => {
            on_update(ConsumerUpdate::Reasoning(text));
            Ok(false)
        }
        Some(SessionOutput::Failed(payload)) => Err(ClientError::Stream(payload)),
        Some(SessionOutput::Finished) => Ok(true),
        None => Ok(false),
    }
}

async fn stream_error(err: EventSourceError) -> ClientError {
    match err {
        EventSourceError::InvalidStatusCode(status, response) => {
            backend_error(status, response).await
        }
        EventSourceError::Transport(err) => ClientError::Transport(err),
        other => ClientError::EventStream(other.to_string()),
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(backend_error(status, response).await)
}

async fn backend_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(2000)
        .collect();
    warn!(status = status.as_u16(), "relay rejected request");
    ClientError::Backend {
        status: status.as_u16(),
        body,
    }
}

/// Per-agent chat histories.
#[derive(Debug, Default)]
pub struct Conversation {
    histories: HashMap<String, Vec<ChatMessage>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, agent: &AgentDescriptor) -> &[ChatMessage] {
        self.histories
            .get(&agent.ui_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Record the user's prompt and return the history to send.
    pub fn begin_turn(&mut self, agent: &AgentDescriptor, prompt: &str) -> &[ChatMessage] {
        let history = self.histories.entry(agent.ui_key.clone()).or_default();
        history.push(ChatMessage::user(prompt));
        history
    }

    /// Record the assistant's reply, substituting the placeholder for blank
    /// text. Returns what was recorded.
    pub fn finish_turn(&mut self, agent: &AgentDescriptor, text: &str) -> String {
        let reply = if text.trim().is_empty() {
            NO_RESPONSE_PLACEHOLDER.to_string()
        } else {
            text.to_string()
        };
        self.histories
            .entry(agent.ui_key.clone())
            .or_default()
            .push(ChatMessage::assistant(reply.clone()));
        reply
    }

    /// Run one full exchange with `agent`.
    ///
    /// On failure the user turn stays recorded and no assistant turn is
    /// added.
    pub async fn ask<F>(
        &mut self,
        client: &RelayClient,
        agent: &AgentDescriptor,
        prompt: &str,
        debug_reasoning: bool,
        on_update: F,
    ) -> ClientResult<String>
    where
        F: FnMut(ConsumerUpdate),
    {
        let history = self.begin_turn(agent, prompt).to_vec();
        let text = client
            .stream_chat(&agent.upstream_agent, &history, debug_reasoning, on_update)
            .await?;
        Ok(self.finish_turn(agent, &text))
    }
}
