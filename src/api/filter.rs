//! Cache-first wrapper around an issued request.
//!
//! A fresh truthy value under the key answers the call and the in-flight request
//! is left to finish unobserved. Otherwise the request's payload is stored
//! under the key (without expiry) and returned.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::transport::{NetworkError, PendingRequest};
use crate::cache::entry::Expires;
use crate::cache::store::{CacheError, SharedStore};
use crate::overlay::is_truthy;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Resolve `pending` through the cache slot `key`.
///
/// With no key the request is simply awaited and its payload returned.
/// Only a truthy cached value is a hit: `null`, `false`, `0` and `""` are
/// refetched and overwritten.
pub async fn cached_fetch(
    store: &SharedStore,
    pending: PendingRequest,
    key: Option<&str>,
) -> Result<Value, FetchError> {
    if let Some(key) = key {
        let cached = store.lock().await.get(key)?;
        if let Some(value) = cached.filter(is_truthy) {
            debug!(key, "Served from cache, in-flight request detached");
            return Ok(value);
        }
    }

    let result = pending.wait().await?.into_result();

    if let Some(key) = key {
        store.lock().await.set(key, result.clone(), Expires::Never)?;
        debug!(key, "Cached fetched payload");
    }

    Ok(result)
}
