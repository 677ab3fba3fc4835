//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::upstream::{UpstreamClient, UpstreamResult};

/// Immutable per-process state. Cloned into every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: RelayConfig) -> UpstreamResult<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
        })
    }
}
