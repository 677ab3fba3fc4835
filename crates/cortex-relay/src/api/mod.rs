//! HTTP API module.
//!
//! `POST /chat/stream` relays one agent run as SSE, `GET /health` reports
//! the routing identifiers and the agent allow-list.

mod auth;
mod error;
mod handlers;
mod routes;
mod state;

pub use auth::{API_KEY_HEADER, require_api_key};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
