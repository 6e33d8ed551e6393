//! tiered-config-cache: client SDK cache for an embedding host.
//!
//! Backend results are cached in one of three tiers per key:
//!   memory (process) → session (until the session ends) → persistent (device)
//!
//! Fetches are cache-first, and the host can push live patches into the cached
//! objects and listen for them over SSE.

pub mod api;
pub mod cache;
pub mod config;
pub mod overlay;
pub mod server;
