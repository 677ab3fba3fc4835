//! Streaming relay between a chat UI and hosted agents.
//!
//! The server side lives in [`api`], [`relay`] and [`upstream`]; [`client`]
//! is the consumer used by the `cortex-chat` binary and by tests.

pub mod api;
pub mod client;
pub mod config;
pub mod logging;
pub mod relay;
pub mod upstream;

pub use config::{ConfigError, RelayConfig};
