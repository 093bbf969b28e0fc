use cashpot::collection::Collection;
use cashpot::store::{DocumentStore, FileStore};
use cashpot::sync::{LocalStorage, SyncBus};
use cashpot::{Fields, Record, SortKey, Store};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use shardmap::ShardMap;
use std::hint::black_box;
use std::path::PathBuf;
use std::time::Duration;

type Records = ShardMap<String, Record>;

fn bench_path(name: &str, size: usize) -> PathBuf {
    std::env::temp_dir().join(format!("cashpot_bench_{}_{}.json", name, size))
}

fn machine(i: usize) -> Fields {
    json!({
        "serial_number": format!("SN-{i:06}"),
        "location_id": format!("locations-{}", i % 17),
        "denomination": 0.01,
        "status": if i % 3 == 0 { "inactive" } else { "active" },
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

fn bench_collection_insert_get_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_insert_get_remove");
    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("shardmap", size), &size, |b, &size| {
            let col = Collection::<Record, Records>::in_memory();
            let records: Vec<Record> =
                (0..size).map(|i| Record::create("slotMachines", machine(i))).collect();
            b.iter(|| {
                for r in &records {
                    col.insert(r.id.clone(), r.clone()).unwrap();
                }
                for r in &records {
                    black_box(col.get(&r.id));
                }
                for r in &records {
                    col.remove(&r.id).unwrap();
                }
            });
        });
    }
}

fn bench_collection_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_flush");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(8));
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("shardmap", size), &size, |b, &size| {
            let path = bench_path("flush", size);
            let _ = std::fs::remove_file(&path);
            let col = Collection::<Record, Records>::open(&path).unwrap();
            col.extend((0..size).map(|i| {
                let r = Record::create("slotMachines", machine(i));
                (r.id.clone(), r)
            }))
            .unwrap();
            b.iter(|| col.flush().unwrap());
            let _ = std::fs::remove_file(&path);
        });
    }
}

fn bench_file_store_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_store_create");
    group.sample_size(20);
    for size in [10, 100] {
        group.bench_with_input(BenchmarkId::new("file", size), &size, |b, &size| {
            let path = bench_path("file_create", size);
            let _ = std::fs::remove_file(&path);
            let store = FileStore::open(&path).unwrap();
            b.iter(|| {
                for i in 0..size {
                    store.create("slotMachines", machine(i)).unwrap();
                }
                store.replace("slotMachines", Vec::new()).unwrap();
            });
            let _ = std::fs::remove_file(&path);
        });
    }
}

fn bench_store_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_update");
    for size in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("document", size), &size, |b, &size| {
            let store = DocumentStore::in_memory();
            let ids: Vec<String> = (0..size)
                .map(|i| store.create("slotMachines", machine(i)).unwrap().id)
                .collect();
            let patch = json!({ "status": "active" }).as_object().cloned().unwrap_or_default();
            b.iter(|| {
                for id in &ids {
                    store.update("slotMachines", id, patch.clone()).unwrap();
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("sync_bus", size), &size, |b, &size| {
            let store = SyncBus::new(LocalStorage::in_memory());
            let ids: Vec<String> = (0..size)
                .map(|i| store.create("slotMachines", machine(i)).unwrap().id)
                .collect();
            let patch = json!({ "status": "active" }).as_object().cloned().unwrap_or_default();
            b.iter(|| {
                for id in ids.iter().take(100) {
                    store.update("slotMachines", id, patch.clone()).unwrap();
                }
            });
        });
    }
}

fn bench_list_sorted(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_sorted");
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("document", size), &size, |b, &size| {
            let store = DocumentStore::in_memory();
            for i in 0..size {
                store.create("slotMachines", machine(size - i)).unwrap();
            }
            let sort = SortKey::parse("-serial_number");
            b.iter(|| black_box(store.list_sorted("slotMachines", sort.as_ref()).unwrap()));
        });
    }
}

criterion_group!(
    benches,
    bench_collection_insert_get_remove,
    bench_collection_flush,
    bench_file_store_create,
    bench_store_update,
    bench_list_sorted,
);
criterion_main!(benches);
