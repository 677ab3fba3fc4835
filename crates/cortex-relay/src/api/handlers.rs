//! HTTP request handlers.

use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use cortex_relay_protocol::{ChatRequest, HealthResponse, RelayEvent};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::relay::spawn_relay;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        db: state.config.upstream.database.clone(),
        schema: state.config.upstream.schema.clone(),
        allowed_agents: state.config.allowed_agents(),
    })
}

/// Relay one agent run as a cleaned SSE stream.
///
/// The agent is checked against the allow-list before anything is sent
/// upstream. Once the stream is open, failures arrive as `error` events.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !state.config.is_allowed(&request.agent) {
        return Err(ApiError::unknown_agent(&request.agent));
    }

    info!(
        agent = %request.agent,
        turns = request.messages.len(),
        debug_reasoning = request.debug_reasoning,
        "chat stream requested"
    );

    let events = spawn_relay(state.upstream.clone(), request);
    let stream = ReceiverStream::new(events).map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &RelayEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.data().to_string())
}
