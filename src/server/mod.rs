//! HTTP server the embedding host talks to.
//!
//! - [`host_api`]: Route handlers and response types
//! - [`streaming`]: SSE stream of host messages for listeners

pub mod host_api;
pub mod streaming;
