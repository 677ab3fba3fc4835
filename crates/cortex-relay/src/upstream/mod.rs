//! Upstream agent service client.
//!
//! Opens one streaming `:run` request per chat request over a shared,
//! keep-alive connection pool.

mod client;
mod error;

pub use client::{UpstreamClient, UpstreamEvents};
pub use error::{UpstreamError, UpstreamResult};
