//! Event-level stream consumption.
//!
//! [`StreamSession`] folds parsed [`StreamEvent`]s into reconciled output.
//! A session is connection-scoped: it owns the filtering policy and the
//! [`Reconciler`], and is dropped with the connection.

use serde_json::Value;
use tracing::debug;

use crate::events::{ErrorPayload, StreamEvent};
use crate::extract::extract_text;
use crate::reconciler::{Delta, Matching, Reconciler};

/// Which events carry text and what happens to reasoning noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPolicy {
    /// Event names whose text is reconciled. An unnamed event always is.
    pub allowed_kinds: Vec<String>,
    /// Substrings marking internal reasoning/progress events.
    pub reasoning_markers: Vec<String>,
    /// Surface reasoning text on the side channel instead of dropping it.
    pub forward_reasoning: bool,
    /// How text fragments are reconciled.
    pub matching: Matching,
}

impl FilterPolicy {
    /// Policy applied to the upstream agent feed.
    pub fn relay(forward_reasoning: bool) -> Self {
        Self {
            allowed_kinds: strings(&["delta", "message", "final", "response"]),
            reasoning_markers: strings(&["thinking", "status"]),
            forward_reasoning,
            matching: Matching::Upstream,
        }
    }

    /// Policy applied by clients to the relay's own feed.
    pub fn consumer(forward_reasoning: bool) -> Self {
        Self {
            allowed_kinds: strings(&["delta", "message"]),
            reasoning_markers: strings(&["thinking", "status", "reasoning"]),
            forward_reasoning,
            matching: Matching::Relayed,
        }
    }

    fn is_reasoning(&self, kind: &str) -> bool {
        self.reasoning_markers.iter().any(|m| kind.contains(m.as_str()))
    }

    fn is_allowed(&self, kind: &str) -> bool {
        kind.is_empty() || self.allowed_kinds.iter().any(|k| k == kind)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Result of feeding one event into a [`StreamSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    Delta(Delta),
    Reasoning(String),
    /// The feed reported an error; the session is over.
    Failed(ErrorPayload),
    /// The feed signalled a clean end; the session is over.
    Finished,
}

impl SessionOutput {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Finished)
    }
}

/// Connection-scoped event state machine.
#[derive(Debug)]
pub struct StreamSession {
    policy: FilterPolicy,
    reconciler: Reconciler,
    terminated: bool,
}

impl StreamSession {
    pub fn new(policy: FilterPolicy) -> Self {
        Self {
            reconciler: Reconciler::with_matching(policy.matching),
            policy,
            terminated: false,
        }
    }

    /// Exact text accepted so far.
    pub fn text(&self) -> &str {
        self.reconciler.text()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed one already-parsed event.
    pub fn push_event(&mut self, event: &StreamEvent) -> Option<SessionOutput> {
        if self.terminated {
            return None;
        }

        let kind = event.kind.to_lowercase();
        match kind.as_str() {
            "done" => return self.terminate(SessionOutput::Finished),
            "error" => {
                let payload = ErrorPayload::from_value(&event.payload);
                return self.terminate(SessionOutput::Failed(payload));
            }
            _ => {}
        }

        if self.policy.is_reasoning(&kind) {
            if !self.policy.forward_reasoning {
                return None;
            }
            return extract_text(&event.payload).map(SessionOutput::Reasoning);
        }

        if !self.policy.is_allowed(&kind) {
            debug!(kind = %kind, "ignoring event kind");
            return None;
        }

        let text = self.fragment(event)?;
        let delta = if self.replaces(event) {
            self.reconciler.replace(&text)
        } else {
            self.reconciler.accept(&text)
        };
        delta.map(SessionOutput::Delta)
    }

    /// Relayed deltas keep their exact `text`, whitespace included.
    fn fragment(&self, event: &StreamEvent) -> Option<String> {
        let relayed = match self.policy.matching {
            Matching::Relayed => event.payload.get("text").and_then(Value::as_str),
            Matching::Upstream => None,
        };
        match relayed {
            Some(text) => Some(text.to_string()),
            None => extract_text(&event.payload),
        }
    }

    /// A relayed delta flagged as a full replacement.
    fn replaces(&self, event: &StreamEvent) -> bool {
        self.policy.matching == Matching::Relayed
            && event.payload.get("replace").and_then(Value::as_bool) == Some(true)
    }

    fn terminate(&mut self, output: SessionOutput) -> Option<SessionOutput> {
        self.terminated = true;
        Some(output)
    }
}
