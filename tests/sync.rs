use cashpot::sync::{storage_key, DataChanged, LocalStorage, StorageEvent, SyncBus, KEY_PREFIX};
use cashpot::{Error, Fields, Record, Store};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn fields(v: Value) -> Fields {
    v.as_object().cloned().unwrap()
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cashpot_sync_{}.json", name))
}

async fn next_change(rx: &mut broadcast::Receiver<DataChanged>) -> DataChanged {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no change within 2s")
        .expect("channel closed")
}

#[test]
fn writes_land_in_storage_under_prefixed_key() {
    let storage = LocalStorage::in_memory();
    let tab = SyncBus::new(Arc::clone(&storage));
    let rec = tab.create("companies", fields(json!({ "name": "Acme" }))).unwrap();

    assert_eq!(storage_key("companies"), format!("{KEY_PREFIX}companies"));
    let raw = storage.get_item("cashpot_companies").unwrap();
    let stored: Vec<Record> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored, vec![rec]);
}

#[test]
fn store_contract_holds() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    let rec = tab.create("providers", fields(json!({ "name": "IGT" }))).unwrap();
    assert_eq!(tab.get("providers", &rec.id).unwrap(), Some(rec.clone()));

    let updated = tab
        .update("providers", &rec.id, fields(json!({ "phone": "1" })))
        .unwrap();
    assert_eq!(updated.created_date, rec.created_date);
    assert!(updated.updated_date > rec.updated_date);
    assert_eq!(updated.str_field("name"), Some("IGT"));

    tab.delete("providers", &rec.id).unwrap();
    assert_eq!(tab.get("providers", &rec.id).unwrap(), None);
    assert!(matches!(tab.delete("providers", &rec.id), Err(Error::NotFound { .. })));
    assert!(matches!(
        tab.update("providers", "nope", Fields::new()),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn mirror_loads_lazily_from_existing_storage() {
    let storage = LocalStorage::in_memory();
    let first = SyncBus::new(Arc::clone(&storage));
    let rec = first.create("cabinets", fields(json!({ "model": "X" }))).unwrap();

    let later = SyncBus::new(storage);
    assert_eq!(later.list("cabinets").unwrap(), vec![rec]);
    assert!(later.list("jackpots").unwrap().is_empty());
}

#[test]
fn own_events_are_ignored() {
    let storage = LocalStorage::in_memory();
    let tab = SyncBus::new(Arc::clone(&storage));
    let event = StorageEvent {
        key: storage_key("companies"),
        new_value: Some("[]".into()),
        origin: tab.tab(),
    };
    assert!(!tab.apply_storage_event(&event));
}

#[test]
fn events_from_other_tabs_refresh_the_mirror() {
    let storage = LocalStorage::in_memory();
    let a = SyncBus::new(Arc::clone(&storage));
    let b = SyncBus::new(Arc::clone(&storage));
    assert_ne!(a.tab(), b.tab());
    assert!(b.list("companies").unwrap().is_empty());

    let mut events = storage.subscribe();
    let rec = a.create("companies", fields(json!({ "name": "Acme" }))).unwrap();
    let event = events.try_recv().unwrap();
    assert_eq!(event.origin, a.tab());

    // b cached the empty list before a wrote
    assert!(b.apply_storage_event(&event));
    assert_eq!(b.list("companies").unwrap(), vec![rec]);
}

#[test]
fn malformed_and_foreign_keys_are_skipped() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    let other = tab.tab() + 100;
    assert!(!tab.apply_storage_event(&StorageEvent {
        key: "theme".into(),
        new_value: Some("dark".into()),
        origin: other,
    }));
    assert!(!tab.apply_storage_event(&StorageEvent {
        key: storage_key("companies"),
        new_value: Some("{ broken".into()),
        origin: other,
    }));
}

#[test]
fn removed_key_empties_the_list() {
    let storage = LocalStorage::in_memory();
    let a = SyncBus::new(Arc::clone(&storage));
    let b = SyncBus::new(Arc::clone(&storage));
    a.create("jackpots", Fields::new()).unwrap();
    assert_eq!(b.list("jackpots").unwrap().len(), 1);

    storage.remove_item(&storage_key("jackpots"), a.tab()).unwrap();
    let event = StorageEvent {
        key: storage_key("jackpots"),
        new_value: None,
        origin: a.tab(),
    };
    assert!(b.apply_storage_event(&event));
    assert!(b.list("jackpots").unwrap().is_empty());
}

#[test]
fn concurrent_tabs_last_write_wins() {
    let storage = LocalStorage::in_memory();
    let a = SyncBus::new(Arc::clone(&storage));
    let b = SyncBus::new(Arc::clone(&storage));

    // both load the same empty list, then write without seeing each other
    assert!(a.list("invoices").unwrap().is_empty());
    assert!(b.list("invoices").unwrap().is_empty());
    a.create("invoices", fields(json!({ "invoice_number": "A-1" }))).unwrap();
    let from_b = b.create("invoices", fields(json!({ "invoice_number": "B-1" }))).unwrap();

    let fresh = SyncBus::new(storage);
    assert_eq!(fresh.list("invoices").unwrap(), vec![from_b]);
}

#[test]
fn local_storage_persists_to_file() {
    let path = temp_path("persist");
    let _ = std::fs::remove_file(&path);
    let rec = {
        let tab = SyncBus::new(LocalStorage::open(&path).unwrap());
        tab.create("locations", fields(json!({ "name": "Depot" }))).unwrap()
    };
    let tab = SyncBus::new(LocalStorage::open(&path).unwrap());
    assert_eq!(tab.list("locations").unwrap(), vec![rec]);
    assert!(tab.storage().keys().contains(&"cashpot_locations".to_string()));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn snapshot_covers_every_stored_entity() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    tab.create("companies", Fields::new()).unwrap();
    tab.create("users", fields(json!({ "username": "ana" }))).unwrap();
    tab.storage().set_item("theme", "dark".into(), tab.tab()).unwrap();

    let snapshot = tab.snapshot().unwrap();
    let names: Vec<&String> = snapshot.keys().collect();
    assert_eq!(names, vec!["companies", "users"]);
}

#[tokio::test]
async fn local_writes_publish_data_changed() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    let mut changes = tab.subscribe();
    let rec = tab.create("platforms", fields(json!({ "name": "Vega" }))).unwrap();

    let change = next_change(&mut changes).await;
    assert_eq!(change.entity, "platforms");
    assert_eq!(change.records, vec![rec]);
}

#[tokio::test]
async fn listener_propagates_between_tabs() {
    let storage = LocalStorage::in_memory();
    let a = Arc::new(SyncBus::new(Arc::clone(&storage)));
    let b = Arc::new(SyncBus::new(Arc::clone(&storage)));
    let _listener = b.spawn_listener();
    let mut b_changes = b.subscribe();

    let rec = a.create("slotMachines", fields(json!({ "serial_number": "SN-7" }))).unwrap();

    let change = next_change(&mut b_changes).await;
    assert_eq!(change.entity, "slotMachines");
    assert_eq!(change.records, vec![rec.clone()]);
    assert_eq!(b.list("slotMachines").unwrap(), vec![rec]);
}

#[tokio::test]
async fn listener_stops_when_tab_is_dropped() {
    let storage = LocalStorage::in_memory();
    let a = SyncBus::new(Arc::clone(&storage));
    let b = Arc::new(SyncBus::new(Arc::clone(&storage)));
    let listener = b.spawn_listener();
    drop(b);

    a.create("companies", Fields::new()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), listener)
        .await
        .expect("listener kept running")
        .unwrap();
}

#[test]
fn import_and_creates_on_one_tab_keep_every_record() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    let seed = SyncBus::new(LocalStorage::in_memory());
    let imported: Vec<Record> = (0..50)
        .map(|i| seed.create("jackpots", fields(json!({ "name": format!("J-{i}") }))).unwrap())
        .collect();

    std::thread::scope(|s| {
        let tab = &tab;
        let batch = imported.clone();
        s.spawn(move || assert_eq!(tab.import("jackpots", batch).unwrap(), 50));
        for t in 0..4 {
            s.spawn(move || {
                for i in 0..25 {
                    tab.create("jackpots", fields(json!({ "name": format!("L-{t}-{i}") })))
                        .unwrap();
                }
            });
        }
    });

    let listed = tab.list("jackpots").unwrap();
    assert_eq!(listed.len(), 150);
    assert!(imported.iter().all(|r| listed.contains(r)));
    let fresh = SyncBus::new(Arc::clone(tab.storage()));
    assert_eq!(fresh.list("jackpots").unwrap().len(), 150);
}

#[test]
fn bulk_delete_is_all_or_nothing() {
    let tab = SyncBus::new(LocalStorage::in_memory());
    let a = tab.create("platforms", Fields::new()).unwrap();
    let b = tab.create("platforms", Fields::new()).unwrap();

    match tab.bulk_delete("platforms", &[a.id.clone(), "p-x".into(), "p-y".into()]) {
        Err(Error::NotFound { entity, id }) => {
            assert_eq!(entity, "platforms");
            assert_eq!(id, "p-x, p-y");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(tab.list("platforms").unwrap().len(), 2);

    std::thread::scope(|s| {
        let tab = &tab;
        s.spawn(move || {
            for _ in 0..20 {
                tab.create("platforms", Fields::new()).unwrap();
            }
        });
        s.spawn(move || assert_eq!(tab.bulk_delete("platforms", &[a.id, b.id]).unwrap(), 2));
    });
    assert_eq!(tab.list("platforms").unwrap().len(), 20);
}
