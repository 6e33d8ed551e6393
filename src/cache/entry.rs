//! Cache entry types and the key → tier table.
//!
//! An entry holds one JSON value plus an optional absolute deadline.
//! Entries never move between tiers: each key is pinned to exactly one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known cache keys.
pub mod keys {
    pub const TOKEN: &str = "TOKEN";
    pub const USER_INFO: &str = "USER_INFO";
    pub const APP_CONFIG: &str = "APP_CONFIG";
    pub const USER_CONFIG: &str = "USER_CONFIG";
    pub const WX_CONFIG: &str = "WX_CONFIG";
}

/// Identifies which storage tier a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Process memory, lost on restart.
    Memory,
    /// Session-scoped storage, survives reloads until the session ends.
    Session,
    /// Device-scoped storage, survives restarts.
    Persistent,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Memory, Tier::Session, Tier::Persistent];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Memory => write!(f, "memory"),
            Tier::Session => write!(f, "session"),
            Tier::Persistent => write!(f, "persistent"),
        }
    }
}

/// Static key → tier assignment. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    assignments: HashMap<String, Tier>,
}

impl KeyTable {
    pub fn new(assignments: impl IntoIterator<Item = (String, Tier)>) -> Self {
        Self {
            assignments: assignments.into_iter().collect(),
        }
    }

    /// Tier a key is assigned to, or None for unknown keys.
    pub fn tier_of(&self, key: &str) -> Option<Tier> {
        self.assignments.get(key).copied()
    }

    /// Keys assigned to the given tier.
    pub fn keys_in(&self, tier: Tier) -> impl Iterator<Item = &str> {
        self.assignments
            .iter()
            .filter(move |(_, t)| **t == tier)
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// How long a written value stays live.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "Value")]
pub enum Expires {
    /// Never expires.
    #[default]
    Never,
    /// Seconds from the moment of the write. Fractions are truncated to milliseconds.
    InSeconds(f64),
    /// Absolute deadline.
    At(DateTime<Utc>),
}

impl Expires {
    /// Resolve to an absolute deadline relative to `now`.
    ///
    /// Called once at write time; the stored deadline is never re-evaluated.
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Expires::Never => None,
            Expires::InSeconds(secs) if secs.is_nan() => None,
            Expires::InSeconds(secs) => {
                // Saturating cast; out-of-range deadlines never expire, or are
                // already past when negative.
                let offset = Duration::try_milliseconds((secs * 1000.0) as i64)
                    .and_then(|delta| now.checked_add_signed(delta));
                match offset {
                    Some(at) => Some(at),
                    None if secs > 0.0 => None,
                    None => Some(now),
                }
            }
            Expires::At(at) => Some(at),
        }
    }

    /// Permissive conversion from an untyped value.
    ///
    /// Numbers are seconds, RFC 3339 strings are absolute instants and every
    /// other shape means "never expires".
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(Expires::Never, Expires::InSeconds),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Expires::At(dt.with_timezone(&Utc)))
                .unwrap_or(Expires::Never),
            _ => Expires::Never,
        }
    }
}

impl From<Value> for Expires {
    fn from(value: Value) -> Self {
        Expires::from_json(&value)
    }
}

/// A stored value plus its optional deadline.
///
/// Serialized as `{ "val": ..., "expires": "<RFC 3339>" | null }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub val: Value,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(val: Value, expires: Expires, now: DateTime<Utc>) -> Self {
        Self {
            val,
            expires: expires.deadline(now),
        }
    }

    /// An entry is live when it has no deadline or the deadline is still ahead.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            None => true,
            Some(at) => at > now,
        }
    }
}
