//! Integration tests for the tiered store.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use tiered_config_cache::cache::backend::FileBackend;
use tiered_config_cache::cache::entry::{Expires, KeyTable, Tier};
use tiered_config_cache::cache::store::{CacheError, TieredStore};

const NAMESPACE: &str = "TEST_NS";

fn keys() -> KeyTable {
    KeyTable::new([
        ("MEM".to_string(), Tier::Memory),
        ("SES".to_string(), Tier::Session),
        ("SES2".to_string(), Tier::Session),
        ("DEV".to_string(), Tier::Persistent),
    ])
}

fn file_store(tmp: &TempDir) -> TieredStore {
    TieredStore::new(
        keys(),
        NAMESPACE,
        Box::new(FileBackend::open(tmp.path().join("session")).unwrap()),
        Box::new(FileBackend::open(tmp.path().join("local")).unwrap()),
    )
}

fn blob(store: &TieredStore, tier: Tier) -> Option<Value> {
    store
        .raw_blob(tier)
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

#[test]
fn test_set_then_get_in_every_tier() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);

    for (i, key) in ["MEM", "SES", "SES2", "DEV"].into_iter().enumerate() {
        let value = json!({"n": i, "tags": ["a", "b"]});
        store.set(key, value.clone(), Expires::Never).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(value));
    }
}

#[test]
fn test_ttl_expiry_is_idempotent() {
    let mut store = TieredStore::in_memory(keys());
    let now = Utc::now();

    for key in ["MEM", "SES", "DEV"] {
        store
            .set_at(key, json!("v"), Expires::InSeconds(5.0), now)
            .unwrap();
        assert_eq!(
            store.get_at(key, now + Duration::seconds(4)).unwrap(),
            Some(json!("v"))
        );

        let after = now + Duration::seconds(6);
        assert_eq!(store.get_at(key, after).unwrap(), None);
        assert_eq!(store.get_at(key, after).unwrap(), None);
    }

    for tier in Tier::ALL {
        assert_eq!(store.tier_stats()[&tier].expired, 1);
    }
}

#[test]
fn test_absolute_deadline() {
    let mut store = TieredStore::in_memory(keys());
    let now = Utc::now();
    store
        .set_at("DEV", json!(1), Expires::At(now + Duration::minutes(1)), now)
        .unwrap();

    assert_eq!(store.get_at("DEV", now).unwrap(), Some(json!(1)));
    assert_eq!(store.get_at("DEV", now + Duration::minutes(2)).unwrap(), None);
}

#[test]
fn test_expired_purge_rewrites_only_that_key() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);
    let now = Utc::now();

    store
        .set_at("SES", json!(1), Expires::InSeconds(1.0), now)
        .unwrap();
    store.set_at("SES2", json!(2), Expires::Never, now).unwrap();

    assert_eq!(store.get_at("SES", now + Duration::seconds(2)).unwrap(), None);
    assert_eq!(
        blob(&store, Tier::Session),
        Some(json!({"SES2": {"val": 2, "expires": null}}))
    );
}

#[test]
fn test_remove_then_get() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);

    for key in ["MEM", "SES", "DEV"] {
        store.set(key, json!(true), Expires::Never).unwrap();
        store.remove(key).unwrap();
        assert_eq!(store.get(key).unwrap(), None);

        // Removing an absent key is a no-op.
        store.remove(key).unwrap();
    }
}

#[test]
fn test_tiers_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);

    store.set("SES", json!("s"), Expires::Never).unwrap();
    store.set("DEV", json!("d"), Expires::Never).unwrap();
    let session_before = store.raw_blob(Tier::Session).unwrap();
    let persistent_before = store.raw_blob(Tier::Persistent).unwrap();

    store.set("MEM", json!("m"), Expires::InSeconds(30.0)).unwrap();
    store.get("MEM").unwrap();
    store.remove("MEM").unwrap();

    assert_eq!(store.raw_blob(Tier::Session).unwrap(), session_before);
    assert_eq!(store.raw_blob(Tier::Persistent).unwrap(), persistent_before);
    assert_eq!(store.raw_blob(Tier::Memory).unwrap(), None);

    // A session write leaves the persistent blob alone.
    store.set("SES2", json!(2), Expires::Never).unwrap();
    assert_eq!(store.raw_blob(Tier::Persistent).unwrap(), persistent_before);
}

#[test]
fn test_unknown_key_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);
    store.set("SES", json!(1), Expires::Never).unwrap();
    let before = store.raw_blob(Tier::Session).unwrap();

    assert!(matches!(store.get("GHOST"), Err(CacheError::UnknownKey(_))));
    assert!(matches!(
        store.set("GHOST", json!(1), Expires::Never),
        Err(CacheError::UnknownKey(_))
    ));

    assert_eq!(store.raw_blob(Tier::Session).unwrap(), before);
    assert_eq!(store.raw_blob(Tier::Persistent).unwrap(), None);
    assert_eq!(store.entry_count(Tier::Memory).unwrap(), 0);
}

#[test]
fn test_persisted_tiers_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let mut store = file_store(&tmp);
        store.set("MEM", json!("gone"), Expires::Never).unwrap();
        store.set("SES", json!("kept"), Expires::Never).unwrap();
        store.set("DEV", json!("kept too"), Expires::Never).unwrap();
    }

    let mut store = file_store(&tmp);
    assert_eq!(store.get("MEM").unwrap(), None);
    assert_eq!(store.get("SES").unwrap(), Some(json!("kept")));
    assert_eq!(store.get("DEV").unwrap(), Some(json!("kept too")));

    store.end_session().unwrap();
    let mut store = file_store(&tmp);
    assert_eq!(store.get("SES").unwrap(), None);
    assert_eq!(store.get("DEV").unwrap(), Some(json!("kept too")));
}

#[test]
fn test_persisted_wire_format() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);
    store.set("DEV", json!({"a": 1}), Expires::Never).unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("local").join("TEST_NS.json")).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, json!({"DEV": {"val": {"a": 1}, "expires": null}}));
}

#[test]
fn test_corrupt_blob_is_storage_error() {
    let tmp = TempDir::new().unwrap();
    let mut store = file_store(&tmp);
    std::fs::write(tmp.path().join("session").join("TEST_NS.json"), "not json").unwrap();

    assert!(matches!(store.get("SES"), Err(CacheError::Storage(_))));
}
