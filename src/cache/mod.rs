//! Tiered cache.
//!
//! - [`entry`]: Entry, Expires, Tier and the static key table
//! - [`backend`]: Blob storage backends for the persisted tiers
//! - [`store`]: TieredStore, routing each key to its assigned tier

pub mod backend;
pub mod entry;
pub mod store;
