//! Benchmarks for the tiered store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use tiered_config_cache::cache::entry::{Expires, KeyTable, Tier};
use tiered_config_cache::cache::store::TieredStore;

fn store_with(keys: usize) -> TieredStore {
    let table = KeyTable::new((0..keys).map(|i| {
        let tier = Tier::ALL[i % Tier::ALL.len()];
        (format!("KEY_{i}"), tier)
    }));
    let mut store = TieredStore::in_memory(table);
    for i in 0..keys {
        store
            .set(&format!("KEY_{i}"), json!({"i": i, "title": "config"}), Expires::Never)
            .unwrap();
    }
    store
}

fn bench_memory_get(c: &mut Criterion) {
    let mut store = store_with(30);

    c.bench_function("memory_tier_get", |b| {
        b.iter(|| black_box(store.get(black_box("KEY_0")).unwrap()))
    });
}

fn bench_persisted_set(c: &mut Criterion) {
    // Every session write rewrites the whole session blob.
    let mut store = store_with(30);
    let value = json!({"shareActivity": true, "title": "x", "desc": "y"});

    c.bench_function("session_tier_set_30_keys", |b| {
        b.iter(|| {
            store
                .set(black_box("KEY_1"), value.clone(), Expires::InSeconds(60.0))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_memory_get, bench_persisted_set);
criterion_main!(benches);
