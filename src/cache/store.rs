//! Tiered store: routes each key to its assigned tier.
//!
//! The store is the single owner of cached state. It:
//! - Resolves keys through the static key table (unknown keys are rejected)
//! - Keeps the memory tier in a plain map
//! - Read-modify-writes the whole blob of a persisted tier on every operation
//! - Purges expired entries lazily on read
//! - Maintains per-tier counters for monitoring

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::backend::{FileBackend, MemoryBackend, StorageBackend, StorageError};
use crate::cache::entry::{Entry, Expires, KeyTable, Tier};
use crate::config::StorageConfig;

/// Namespace persisted blobs are stored under unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "SDK_CACHE_V1";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Unknown cache key: {0}")]
    UnknownKey(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-tier operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Reads that returned a live value.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Reads that found an expired entry and purged it.
    pub expired: u64,
    /// Writes.
    pub writes: u64,
    /// Explicit removals of an existing entry.
    pub removals: u64,
}

impl TierStats {
    /// Fraction of reads that returned a value (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hits + self.misses + self.expired;
        if reads == 0 {
            return 0.0;
        }
        self.hits as f64 / reads as f64
    }
}

type Blob = BTreeMap<String, Entry>;

/// A persisted tier: the whole key → entry map lives in one blob.
struct PersistedTier {
    namespace: String,
    backend: Box<dyn StorageBackend>,
}

impl PersistedTier {
    fn read(&self) -> Result<Blob, StorageError> {
        match self.backend.load(&self.namespace)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Blob::new()),
        }
    }

    fn write(&mut self, blob: &Blob) -> Result<(), StorageError> {
        let raw = serde_json::to_string(blob)?;
        self.backend.save(&self.namespace, &raw)
    }
}

enum TierBacking {
    Memory(HashMap<String, Entry>),
    Persisted(PersistedTier),
}

impl TierBacking {
    fn get(&self, key: &str) -> Result<Option<Entry>, StorageError> {
        match self {
            TierBacking::Memory(map) => Ok(map.get(key).cloned()),
            TierBacking::Persisted(tier) => Ok(tier.read()?.remove(key)),
        }
    }

    fn put(&mut self, key: &str, entry: Entry) -> Result<(), StorageError> {
        match self {
            TierBacking::Memory(map) => {
                map.insert(key.to_string(), entry);
                Ok(())
            }
            TierBacking::Persisted(tier) => {
                let mut blob = tier.read()?;
                blob.insert(key.to_string(), entry);
                tier.write(&blob)
            }
        }
    }

    /// Returns whether an entry existed.
    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        match self {
            TierBacking::Memory(map) => Ok(map.remove(key).is_some()),
            TierBacking::Persisted(tier) => {
                let mut blob = tier.read()?;
                if blob.remove(key).is_none() {
                    return Ok(false);
                }
                tier.write(&blob)?;
                Ok(true)
            }
        }
    }

    fn len(&self) -> Result<usize, StorageError> {
        match self {
            TierBacking::Memory(map) => Ok(map.len()),
            TierBacking::Persisted(tier) => Ok(tier.read()?.len()),
        }
    }
}

/// The keyed, three-tier cache.
pub struct TieredStore {
    /// Key → tier assignments.
    keys: KeyTable,

    memory: TierBacking,
    session: TierBacking,
    persistent: TierBacking,

    /// Per-tier counters.
    stats: HashMap<Tier, TierStats>,
}

impl TieredStore {
    /// Create a store over the given session and persistent backends.
    pub fn new(
        keys: KeyTable,
        namespace: impl Into<String>,
        session: Box<dyn StorageBackend>,
        persistent: Box<dyn StorageBackend>,
    ) -> Self {
        let namespace = namespace.into();
        let stats = Tier::ALL
            .iter()
            .map(|tier| (*tier, TierStats::default()))
            .collect();

        info!(
            keys = keys.len(),
            namespace = %namespace,
            session = session.name(),
            persistent = persistent.name(),
            "Tiered store ready"
        );

        Self {
            keys,
            memory: TierBacking::Memory(HashMap::new()),
            session: TierBacking::Persisted(PersistedTier {
                namespace: namespace.clone(),
                backend: session,
            }),
            persistent: TierBacking::Persisted(PersistedTier {
                namespace,
                backend: persistent,
            }),
            stats,
        }
    }

    /// A store whose persisted tiers are in-process maps.
    pub fn in_memory(keys: KeyTable) -> Self {
        Self::new(
            keys,
            DEFAULT_NAMESPACE,
            Box::new(MemoryBackend::new()),
            Box::new(MemoryBackend::new()),
        )
    }

    /// A store backed by files in the configured directories.
    ///
    /// Both tiers use the same blob name, so their directories must differ.
    pub fn open(config: &StorageConfig, keys: KeyTable) -> Result<Self, StorageError> {
        let session = FileBackend::open(&config.session_dir)?;
        let persistent = FileBackend::open(&config.persistent_dir)?;
        if session.same_location(&persistent)? {
            return Err(StorageError::SharedLocation(config.session_dir.clone()));
        }
        Ok(Self::new(
            keys,
            config.namespace.clone(),
            Box::new(session),
            Box::new(persistent),
        ))
    }

    fn tier_for(&self, key: &str) -> Result<Tier, CacheError> {
        self.keys
            .tier_of(key)
            .ok_or_else(|| CacheError::UnknownKey(key.to_string()))
    }

    fn backing(&self, tier: Tier) -> &TierBacking {
        match tier {
            Tier::Memory => &self.memory,
            Tier::Session => &self.session,
            Tier::Persistent => &self.persistent,
        }
    }

    fn backing_mut(&mut self, tier: Tier) -> &mut TierBacking {
        match tier {
            Tier::Memory => &mut self.memory,
            Tier::Session => &mut self.session,
            Tier::Persistent => &mut self.persistent,
        }
    }

    fn stats_mut(&mut self, tier: Tier) -> &mut TierStats {
        self.stats.entry(tier).or_default()
    }

    /// Read a live value.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>, CacheError> {
        self.get_at(key, Utc::now())
    }

    /// Read a live value as of `now`. An expired entry is deleted and reads as None.
    pub fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Result<Option<Value>, CacheError> {
        let tier = self.tier_for(key)?;

        let entry = match self.backing(tier).get(key)? {
            Some(entry) => entry,
            None => {
                self.stats_mut(tier).misses += 1;
                debug!(key, tier = %tier, "Cache miss");
                return Ok(None);
            }
        };

        if entry.is_live(now) {
            self.stats_mut(tier).hits += 1;
            debug!(key, tier = %tier, "Cache hit");
            return Ok(Some(entry.val));
        }

        self.backing_mut(tier).delete(key)?;
        self.stats_mut(tier).expired += 1;
        debug!(key, tier = %tier, expires = ?entry.expires, "Purged expired entry");
        Ok(None)
    }

    /// Write a value, replacing any existing entry for the key.
    pub fn set(&mut self, key: &str, value: Value, expires: Expires) -> Result<(), CacheError> {
        self.set_at(key, value, expires, Utc::now())
    }

    /// Write a value with the deadline resolved against `now`.
    pub fn set_at(
        &mut self,
        key: &str,
        value: Value,
        expires: Expires,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let tier = self.tier_for(key)?;
        let entry = Entry::new(value, expires, now);
        let deadline = entry.expires;

        self.backing_mut(tier).put(key, entry)?;
        self.stats_mut(tier).writes += 1;
        debug!(key, tier = %tier, expires = ?deadline, "Stored entry");
        Ok(())
    }

    /// Delete the entry for a key. No-op when absent.
    pub fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        let tier = self.tier_for(key)?;
        if self.backing_mut(tier).delete(key)? {
            self.stats_mut(tier).removals += 1;
            debug!(key, tier = %tier, "Removed entry");
        }
        Ok(())
    }

    /// Drop the whole session tier, as when the browsing session ends.
    pub fn end_session(&mut self) -> Result<(), StorageError> {
        if let TierBacking::Persisted(tier) = &mut self.session {
            tier.backend.clear(&tier.namespace)?;
            info!(namespace = %tier.namespace, "Session tier cleared");
        }
        Ok(())
    }

    /// Serialized blob of a persisted tier. Always None for the memory tier.
    pub fn raw_blob(&self, tier: Tier) -> Result<Option<String>, StorageError> {
        match self.backing(tier) {
            TierBacking::Memory(_) => Ok(None),
            TierBacking::Persisted(p) => p.backend.load(&p.namespace),
        }
    }

    /// Number of entries (live or not yet purged) currently held by a tier.
    pub fn entry_count(&self, tier: Tier) -> Result<usize, StorageError> {
        self.backing(tier).len()
    }

    /// Get tier statistics for monitoring.
    pub fn tier_stats(&self) -> &HashMap<Tier, TierStats> {
        &self.stats
    }

    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }
}

/// The store as shared by every consumer in a process.
pub type SharedStore = Arc<Mutex<TieredStore>>;

/// Wrap a store for sharing.
pub fn new_shared_store(store: TieredStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn test_keys() -> KeyTable {
        KeyTable::new([
            ("MEM".to_string(), Tier::Memory),
            ("SES".to_string(), Tier::Session),
            ("DEV".to_string(), Tier::Persistent),
        ])
    }

    #[test]
    fn test_set_get_every_tier() {
        let mut store = TieredStore::in_memory(test_keys());
        for key in ["MEM", "SES", "DEV"] {
            store.set(key, json!({"k": key}), Expires::Never).unwrap();
            assert_eq!(store.get(key).unwrap(), Some(json!({"k": key})));
        }
    }

    #[test]
    fn test_expired_entry_is_purged() {
        let mut store = TieredStore::in_memory(test_keys());
        let now = Utc::now();
        store
            .set_at("SES", json!(1), Expires::InSeconds(10.0), now)
            .unwrap();

        let later = now + Duration::seconds(11);
        assert_eq!(store.get_at("SES", later).unwrap(), None);
        assert_eq!(store.entry_count(Tier::Session).unwrap(), 0);

        let stats = &store.tier_stats()[&Tier::Session];
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut store = TieredStore::in_memory(test_keys());
        assert!(matches!(store.get("NOPE"), Err(CacheError::UnknownKey(k)) if k == "NOPE"));
        assert!(matches!(
            store.set("NOPE", json!(1), Expires::Never),
            Err(CacheError::UnknownKey(_))
        ));
        assert!(matches!(store.remove("NOPE"), Err(CacheError::UnknownKey(_))));
    }

    #[test]
    fn test_quota_surfaces_as_storage_error() {
        let mut store = TieredStore::new(
            test_keys(),
            DEFAULT_NAMESPACE,
            Box::new(MemoryBackend::with_quota(16)),
            Box::new(MemoryBackend::new()),
        );

        let err = store
            .set("SES", json!("a value that is far too long"), Expires::Never)
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Storage(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(store.get("SES").unwrap(), None);
    }

    #[test]
    fn test_end_session_keeps_persistent() {
        let mut store = TieredStore::in_memory(test_keys());
        store.set("SES", json!(1), Expires::Never).unwrap();
        store.set("DEV", json!(2), Expires::Never).unwrap();

        store.end_session().unwrap();
        assert_eq!(store.get("SES").unwrap(), None);
        assert_eq!(store.get("DEV").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_open_rejects_shared_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            namespace: DEFAULT_NAMESPACE.to_string(),
            session_dir: tmp.path().join("tiers"),
            persistent_dir: tmp.path().join("tiers").join("."),
        };

        let err = TieredStore::open(&config, test_keys()).err().unwrap();
        assert!(matches!(err, StorageError::SharedLocation(_)));
    }

    #[test]
    fn test_huge_ttl_does_not_panic() {
        let mut store = TieredStore::in_memory(test_keys());
        store.set("DEV", json!(1), Expires::InSeconds(1e13)).unwrap();
        assert_eq!(store.get("DEV").unwrap(), Some(json!(1)));
        assert!(store.raw_blob(Tier::Persistent).unwrap().unwrap().contains(r#""expires":null"#));
    }

    #[test]
    fn test_hit_ratio() {
        let mut store = TieredStore::in_memory(test_keys());
        store.get("MEM").unwrap();
        store.set("MEM", json!(true), Expires::Never).unwrap();
        store.get("MEM").unwrap();

        let stats = &store.tier_stats()[&Tier::Memory];
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < 1e-10);
    }
}
