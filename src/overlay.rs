//! Live updates pushed by the embedding host.
//!
//! A host message either patches one page of the cached user config or
//! merges fields into the cached app config. Every message, whatever its
//! type, is then fanned out to the registered listeners.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cache::entry::{keys, Expires};
use crate::cache::store::{CacheError, SharedStore, TieredStore};

pub const UPDATE_PAGE: &str = "update_page";
pub const UPDATE_INFO: &str = "update_info";

/// A message from the embedding host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    #[serde(rename = "pageKey", default, skip_serializing_if = "Option::is_none")]
    pub page_key: Option<String>,
}

impl HostMessage {
    pub fn update_page(page_key: impl Into<String>, data: Value) -> Self {
        Self {
            kind: UPDATE_PAGE.to_string(),
            data,
            page_key: Some(page_key.into()),
        }
    }

    pub fn update_info(data: Value) -> Self {
        Self {
            kind: UPDATE_INFO.to_string(),
            data,
            page_key: None,
        }
    }
}

/// What applying a message did to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The cached object was updated and written back.
    Merged,
    /// The message does not touch the cache (other type, or falsy data).
    Ignored,
    /// The message targets the cache but there was nothing to merge into.
    Skipped(String),
}

/// JSON truthiness: null, false, 0 and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Copy every truthy field of `patch` over `target`.
pub fn merge_truthy(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (field, value) in patch {
        if is_truthy(value) {
            target.insert(field.clone(), value.clone());
        }
    }
}

fn pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Apply one host message to the store.
///
/// Merged values are written back without expiry, whatever the previous entry had.
pub fn apply_update(store: &mut TieredStore, message: &HostMessage) -> Result<MergeOutcome, CacheError> {
    if !is_truthy(&message.data) {
        return Ok(MergeOutcome::Ignored);
    }

    match message.kind.as_str() {
        UPDATE_PAGE => {
            let Some(page_key) = message.page_key.as_deref() else {
                return Ok(skipped("update_page without pageKey"));
            };
            let Some(mut config) = store.get(keys::USER_CONFIG)? else {
                return Ok(skipped("no cached user config"));
            };

            let pointer = format!("/page/{}", pointer_token(page_key));
            match config.pointer_mut(&pointer) {
                Some(Value::Object(page)) => {
                    page.insert("data".to_string(), message.data.clone());
                }
                _ => return Ok(skipped(&format!("no page {page_key} in user config"))),
            }

            store.set(keys::USER_CONFIG, config, Expires::Never)?;
            debug!(page_key, "Page data replaced");
            Ok(MergeOutcome::Merged)
        }
        UPDATE_INFO => {
            let Value::Object(patch) = &message.data else {
                return Ok(skipped("update_info data is not an object"));
            };
            let Some(mut config) = store.get(keys::APP_CONFIG)? else {
                return Ok(skipped("no cached app config"));
            };
            let Value::Object(fields) = &mut config else {
                return Ok(skipped("cached app config is not an object"));
            };

            merge_truthy(fields, patch);
            store.set(keys::APP_CONFIG, config, Expires::Never)?;
            debug!(fields = patch.len(), "App config merged");
            Ok(MergeOutcome::Merged)
        }
        _ => Ok(MergeOutcome::Ignored),
    }
}

fn skipped(reason: &str) -> MergeOutcome {
    warn!(reason, "Host update not merged");
    MergeOutcome::Skipped(reason.to_string())
}

/// Applies host messages and fans them out to listeners.
#[derive(Clone)]
pub struct UpdateHub {
    store: SharedStore,
    sender: broadcast::Sender<HostMessage>,
    closed: Arc<watch::Sender<bool>>,
}

impl UpdateHub {
    pub fn new(store: SharedStore, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            store,
            sender,
            closed: Arc::new(closed),
        }
    }

    /// Ends every listener stream, present and future.
    pub fn close(&self) {
        self.closed.send_replace(true);
        info!(listeners = self.listener_count(), "Update listeners closed");
    }

    /// Flips to `true` once the hub is closed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Register a listener. It receives every message dispatched afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Merge the message into the cache, then deliver it to every listener.
    pub async fn dispatch(&self, message: HostMessage) -> Result<MergeOutcome, CacheError> {
        let outcome = {
            let mut store = self.store.lock().await;
            apply_update(&mut store, &message)?
        };

        // No listeners is not an error.
        let delivered = self.sender.send(message).unwrap_or(0);
        debug!(delivered, outcome = ?outcome, "Host message dispatched");
        Ok(outcome)
    }
}
