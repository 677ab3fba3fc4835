//! Stream text reconciliation.
//!
//! The upstream feed mixes genuine incremental deltas, full snapshots of the
//! text so far, and verbatim repeats. [`Reconciler`] turns that into a clean
//! sequence of deltas: nothing is emitted twice and the accumulated text never
//! shrinks.
//!
//! Comparisons run on [`normalize`]d text so that whitespace reflow between
//! snapshots does not defeat prefix matching. Emitted text always keeps the
//! original formatting.
//!
//! A feed that has already been through a reconciler is read back with
//! [`Matching::Relayed`]: every fragment is then an append, and replacements
//! arrive explicitly through [`Reconciler::replace`].

use tracing::trace;

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text accepted by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// New text to append to what was already emitted.
    Append(String),
    /// A full snapshot whose normalized form extends the emitted text but
    /// whose exact form does not; it supersedes everything emitted so far.
    Replace(String),
}

impl Delta {
    pub fn text(&self) -> &str {
        match self {
            Self::Append(text) | Self::Replace(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Append(text) | Self::Replace(text) => text,
        }
    }
}

/// How incoming fragments are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Matching {
    /// Raw feed: repeats, snapshots and stale snapshots are all possible.
    #[default]
    Upstream,
    /// Feed of deltas already cleaned by another reconciler.
    Relayed,
}

/// Per-request reconciliation state.
///
/// Invariant: `sent_normalized == normalize(&sent_exact)` after every call.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    matching: Matching,
    sent_exact: String,
    sent_normalized: String,
    last_fragment: String,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matching(matching: Matching) -> Self {
        Self {
            matching,
            ..Self::default()
        }
    }

    pub fn matching(&self) -> Matching {
        self.matching
    }

    /// Exact text emitted so far.
    pub fn text(&self) -> &str {
        &self.sent_exact
    }

    pub fn is_empty(&self) -> bool {
        self.sent_exact.is_empty()
    }

    /// Classify one fragment and return the delta to emit, if any.
    pub fn accept(&mut self, text: &str) -> Option<Delta> {
        match self.matching {
            Matching::Upstream => self.accept_upstream(text),
            Matching::Relayed => self.accept_relayed(text),
        }
    }

    fn accept_upstream(&mut self, text: &str) -> Option<Delta> {
        let norm = normalize(text);
        if norm.is_empty() {
            return None;
        }

        if norm == self.last_fragment {
            trace!(fragment = %norm, "dropping repeated fragment");
            return None;
        }
        self.last_fragment.clone_from(&norm);

        if !self.sent_normalized.is_empty() && norm.starts_with(&self.sent_normalized) {
            // Growing snapshot of everything sent so far.
            let delta = match text.strip_prefix(self.sent_exact.as_str()) {
                Some("") => None,
                Some(suffix) => Some(Delta::Append(suffix.to_string())),
                None => Some(Delta::Replace(text.to_string())),
            };
            self.sent_exact = text.to_string();
            self.sent_normalized = norm;
            return delta;
        }

        if !self.sent_normalized.is_empty() && self.sent_normalized.starts_with(&norm) {
            trace!(fragment = %norm, "dropping stale snapshot");
            return None;
        }

        self.append(text)
    }

    /// Cleaned deltas are never repeats or stale: every one is appended as is.
    fn accept_relayed(&mut self, text: &str) -> Option<Delta> {
        if text.is_empty() {
            return None;
        }
        self.append(text)
    }

    /// Supersede everything accepted so far with `text`.
    ///
    /// Used when a relayed feed marks a delta as a full replacement.
    pub fn replace(&mut self, text: &str) -> Option<Delta> {
        if text == self.sent_exact {
            return None;
        }
        trace!(chars = text.chars().count(), "replacing accepted text");
        self.sent_exact = text.to_string();
        self.sent_normalized = normalize(text);
        self.last_fragment.clone_from(&self.sent_normalized);
        Some(Delta::Replace(text.to_string()))
    }

    fn append(&mut self, text: &str) -> Option<Delta> {
        self.sent_exact.push_str(text);
        self.sent_normalized = normalize(&self.sent_exact);
        Some(Delta::Append(text.to_string()))
    }
}
