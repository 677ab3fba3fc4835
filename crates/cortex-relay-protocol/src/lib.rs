//! Canonical protocol types for the Cortex agent relay.
//!
//! Shared by the relay service and the chat consumer. Everything here is
//! synchronous and free of I/O: chat history shapes, the agent catalog,
//! outbound event framing, and the stream reconciliation state machine that
//! both sides run over their inbound SSE feed.

pub mod agents;
pub mod events;
pub mod extract;
pub mod messages;
pub mod reconciler;
pub mod sse;

pub use agents::{AgentDescriptor, default_catalog, find_agent};
pub use events::{ErrorPayload, RelayEvent, StreamEvent};
pub use extract::extract_text;
pub use messages::{ChatMessage, ChatRequest, HealthResponse, Role, last_turns, upstream_messages};
pub use reconciler::{Delta, Matching, Reconciler, normalize};
pub use sse::{FilterPolicy, SessionOutput, StreamSession};
