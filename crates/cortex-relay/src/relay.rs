//! Upstream-to-client relaying.
//!
//! Each chat request gets one background task that reads the upstream
//! events, runs them through a relay-policy [`StreamSession`], and pushes the
//! resulting [`RelayEvent`]s into a bounded channel drained by the SSE
//! response. The task only reads the next upstream event once the previous
//! one has been handed to the channel, and stops as soon as the receiving
//! side is dropped.

use std::fmt::Display;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cortex_relay_protocol::{
    ChatRequest, Delta, ErrorPayload, FilterPolicy, RelayEvent, SessionOutput, StreamEvent,
    StreamSession,
};

use crate::upstream::UpstreamClient;

/// Events buffered between the relay task and the HTTP response.
pub const CHANNEL_CAPACITY: usize = 16;

/// Start relaying `request` and return the receiving end of its event stream.
pub fn spawn_relay(upstream: UpstreamClient, request: ChatRequest) -> mpsc::Receiver<RelayEvent> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_relay(upstream, request, tx));
    rx
}

async fn run_relay(upstream: UpstreamClient, request: ChatRequest, tx: mpsc::Sender<RelayEvent>) {
    let opened = tokio::select! {
        _ = tx.closed() => {
            debug!(agent = %request.agent, "client went away before upstream answered");
            return;
        }
        opened = upstream.run(&request.agent, &request.messages) => opened,
    };

    match opened {
        Ok(events) => {
            let summary = pump(events, request.debug_reasoning, &tx).await;
            info!(
                agent = %request.agent,
                deltas = summary.deltas,
                replaced = summary.replaced,
                outcome = ?summary.outcome,
                "relay finished"
            );
        }
        Err(err) => {
            warn!(agent = %request.agent, error = %err, "upstream run failed");
            let _ = tx.send(RelayEvent::Error(err.to_payload())).await;
        }
    }
}

/// How a relayed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed,
    Disconnected,
}

/// Counters reported once a stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub deltas: usize,
    pub replaced: usize,
    pub outcome: Outcome,
}

/// Relay-side connection state: the stream session plus counters.
#[derive(Debug)]
pub struct RelaySession {
    session: StreamSession,
    deltas: usize,
    replaced: usize,
}

impl RelaySession {
    pub fn new(debug_reasoning: bool) -> Self {
        Self {
            session: StreamSession::new(FilterPolicy::relay(debug_reasoning)),
            deltas: 0,
            replaced: 0,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.session.is_terminated()
    }

    /// Exact text relayed so far.
    pub fn text(&self) -> &str {
        self.session.text()
    }

    /// Outbound event produced by one upstream event, if any.
    pub fn push_event(&mut self, event: &StreamEvent) -> Option<RelayEvent> {
        let event = match self.session.push_event(event)? {
            SessionOutput::Delta(Delta::Append(text)) => RelayEvent::Delta(text),
            SessionOutput::Delta(Delta::Replace(text)) => {
                debug!(chars = text.chars().count(), "snapshot reflowed, relaying full text");
                self.replaced += 1;
                RelayEvent::Replace(text)
            }
            SessionOutput::Reasoning(text) => RelayEvent::Reasoning(text),
            SessionOutput::Failed(payload) => RelayEvent::Error(payload),
            SessionOutput::Finished => RelayEvent::Done,
        };
        if matches!(event, RelayEvent::Delta(_) | RelayEvent::Replace(_)) {
            self.deltas += 1;
        }
        Some(event)
    }
}

/// Drive `events` to completion, forwarding relay events into `tx`.
///
/// Always ends with exactly one terminal event unless the client is gone:
/// `done` on a clean end, `error` on an upstream error event or a stream
/// failure.
pub async fn pump<S, E>(mut events: S, debug_reasoning: bool, tx: &mpsc::Sender<RelayEvent>) -> RelaySummary
where
    S: Stream<Item = Result<StreamEvent, E>> + Unpin,
    E: Display,
{
    let mut relay = RelaySession::new(debug_reasoning);

    let outcome = loop {
        let next = tokio::select! {
            _ = tx.closed() => break Outcome::Disconnected,
            next = events.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => relay.push_event(&event),
            Some(Err(err)) => {
                warn!(error = %err, "upstream stream failed");
                Some(RelayEvent::Error(ErrorPayload::exception(err.to_string())))
            }
            None => Some(RelayEvent::Done),
        };
        let Some(event) = event else {
            continue;
        };

        let terminal = match event {
            RelayEvent::Done => Some(Outcome::Done),
            RelayEvent::Error(_) => Some(Outcome::Failed),
            _ => None,
        };
        if tx.send(event).await.is_err() {
            break Outcome::Disconnected;
        }
        if let Some(outcome) = terminal {
            break outcome;
        }
    };

    if outcome == Outcome::Disconnected {
        debug!("client disconnected, releasing upstream stream");
    }

    RelaySummary {
        deltas: relay.deltas,
        replaced: relay.replaced,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{Value, json};

    fn ev(kind: &str, payload: Value) -> Result<StreamEvent, String> {
        Ok(StreamEvent::new(kind, payload))
    }

    async fn collect(
        items: Vec<Result<StreamEvent, String>>,
        debug: bool,
    ) -> (Vec<RelayEvent>, RelaySummary) {
        let (tx, mut rx) = mpsc::channel(64);
        let summary = pump(stream::iter(items), debug, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, summary)
    }

    #[tokio::test]
    async fn relays_cleaned_deltas_then_done() {
        let items = vec![
            ev("response.status", json!({"message": "Planning"})),
            ev("delta", json!({"text": "Bonjour"})),
            ev("delta", json!({"text": "Bonjour"})),
            ev("response", json!({"text": "Bonjour, comment"})),
        ];
        let (events, summary) = collect(items, false).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Delta("Bonjour".into()),
                RelayEvent::Delta(", comment".into()),
                RelayEvent::Done,
            ]
        );
        assert_eq!(summary.deltas, 2);
        assert_eq!(summary.outcome, Outcome::Done);
    }

    #[tokio::test]
    async fn debug_mode_forwards_reasoning() {
        let items = vec![ev("response.thinking.delta", json!({"text": "hmm"}))];
        let (events, _) = collect(items, true).await;
        assert_eq!(events, vec![RelayEvent::Reasoning("hmm".into()), RelayEvent::Done]);
    }

    #[tokio::test]
    async fn stream_failure_ends_with_error_and_no_done() {
        let items = vec![
            ev("", json!({"text": "partiel"})),
            Err("operation timed out".to_string()),
            ev("", json!({"text": "never"})),
        ];
        let (events, summary) = collect(items, false).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Delta("partiel".into()),
                RelayEvent::Error(ErrorPayload::exception("operation timed out")),
            ]
        );
        assert_eq!(summary.outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn upstream_error_event_is_forwarded_and_ends_stream() {
        let items = vec![
            ev("error", json!({"status": 500, "body": "agent crashed"})),
            ev("delta", json!({"text": "late"})),
        ];
        let (events, summary) = collect(items, false).await;
        assert_eq!(
            events,
            vec![RelayEvent::Error(ErrorPayload::Status {
                status: 500,
                body: "agent crashed".into()
            })]
        );
        assert_eq!(summary.outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn upstream_done_stops_reading() {
        let items = vec![
            ev("message", json!({"text": "fini"})),
            ev("done", json!({})),
            ev("message", json!({"text": "ignored"})),
        ];
        let (events, _) = collect(items, false).await;
        assert_eq!(events, vec![RelayEvent::Delta("fini".into()), RelayEvent::Done]);
    }

    #[tokio::test]
    async fn reflowed_snapshot_is_relayed_as_replace() {
        let items = vec![
            ev("delta", json!({"text": "Total:\n42"})),
            ev("delta", json!({"text": "Total: 42 unités"})),
        ];
        let (events, summary) = collect(items, false).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Delta("Total:\n42".into()),
                RelayEvent::Replace("Total: 42 unités".into()),
                RelayEvent::Done,
            ]
        );
        assert_eq!(summary.deltas, 2);
        assert_eq!(summary.replaced, 1);
    }

    #[tokio::test]
    async fn stops_when_client_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let events = stream::pending::<Result<StreamEvent, String>>();
        let summary = pump(events, false, &tx).await;
        assert_eq!(summary.outcome, Outcome::Disconnected);
    }
}
