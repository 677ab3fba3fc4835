//! Upstream client error types.

use thiserror::Error;

use cortex_relay_protocol::ErrorPayload;

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors that can occur while talking to the upstream agent service.
/// None of them are retried.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The service answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connect/read timeout, connection drop, or any other transport failure.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The event stream broke or carried something unreadable.
    #[error("upstream stream failed: {0}")]
    Stream(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest_eventsource::Error> for UpstreamError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        match err {
            reqwest_eventsource::Error::Transport(e) => Self::Transport(e),
            reqwest_eventsource::Error::InvalidStatusCode(status, _) => Self::Status {
                status: status.as_u16(),
                body: String::new(),
            },
            other => Self::Stream(other.to_string()),
        }
    }
}

impl UpstreamError {
    /// Payload for the outbound `error` event.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::Status { status, body } => ErrorPayload::Status {
                status: *status,
                body: body.clone(),
            },
            other => ErrorPayload::exception(other.to_string()),
        }
    }
}
