use cashpot::store::FileStore;
use cashpot::{Error, Fields, SortKey, Store};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cashpot_file_store_{}.json", name))
}

fn fresh(name: &str) -> (FileStore, std::path::PathBuf) {
    let path = temp_path(name);
    let _ = std::fs::remove_file(&path);
    (FileStore::open(&path).unwrap(), path)
}

fn fields(v: Value) -> Fields {
    v.as_object().cloned().unwrap()
}

#[test]
fn open_writes_empty_document() {
    let (_store, path) = fresh("empty");
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.trim(), "{}");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn create_assigns_id_and_timestamps() {
    let (store, path) = fresh("create");
    let payload = fields(json!({ "name": "Acme", "phone": "0740", "tags": ["a", "b"] }));
    let a = store.create("companies", payload.clone()).unwrap();
    let b = store.create("companies", payload.clone()).unwrap();

    assert!(a.id.starts_with("companies-"));
    assert_ne!(a.id, b.id);
    assert_eq!(a.created_date, a.updated_date);
    for (key, value) in &payload {
        assert_eq!(a.field(key), Some(value));
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn whole_dataset_lives_in_one_document() {
    let (store, path) = fresh("layout");
    store.create("companies", fields(json!({ "name": "Acme" }))).unwrap();
    store.create("slotMachines", fields(json!({ "serial_number": "SN-1" }))).unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["companies"].as_array().unwrap().len(), 1);
    assert_eq!(raw["slotMachines"][0]["serial_number"], json!("SN-1"));
    assert!(raw["slotMachines"][0]["created_date"].is_string());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn update_merges_and_keeps_created_date() {
    let (store, path) = fresh("update");
    let rec = store
        .create("companies", fields(json!({ "name": "Acme", "email": "old@acme.test" })))
        .unwrap();
    let updated = store
        .update("companies", &rec.id, fields(json!({ "email": "new@acme.test" })))
        .unwrap();

    assert_eq!(updated.id, rec.id);
    assert_eq!(updated.created_date, rec.created_date);
    assert!(updated.updated_date > rec.updated_date);
    assert_eq!(updated.str_field("name"), Some("Acme"));
    assert_eq!(updated.str_field("email"), Some("new@acme.test"));
    assert_eq!(store.get("companies", &rec.id).unwrap(), Some(updated));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_ids() {
    let (store, path) = fresh("missing");
    assert_eq!(store.get("companies", "nope").unwrap(), None);
    assert!(matches!(
        store.update("companies", "nope", Fields::new()),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(store.delete("companies", "nope"), Err(Error::NotFound { .. })));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn delete_then_get_is_none() {
    let (store, path) = fresh("delete");
    let rec = store.create("cabinets", fields(json!({ "model": "M1" }))).unwrap();
    store.delete("cabinets", &rec.id).unwrap();
    assert_eq!(store.get("cabinets", &rec.id).unwrap(), None);
    assert!(store.list("cabinets").unwrap().is_empty());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn list_keeps_insertion_order_and_sorts_on_request() {
    let (store, path) = fresh("sort");
    for n in [3, 1, 2] {
        store.create("jackpots", fields(json!({ "level": n }))).unwrap();
    }
    let levels = |records: Vec<cashpot::Record>| -> Vec<Value> {
        records.iter().map(|r| r.field("level").cloned().unwrap()).collect()
    };
    assert_eq!(levels(store.list("jackpots").unwrap()), vec![json!(3), json!(1), json!(2)]);

    let asc = store.list_sorted("jackpots", SortKey::parse("level").as_ref()).unwrap();
    assert_eq!(levels(asc), vec![json!(1), json!(2), json!(3)]);

    let newest_first = store
        .list_sorted("jackpots", SortKey::parse("-created_date").as_ref())
        .unwrap();
    assert!(newest_first
        .windows(2)
        .all(|w| w[0].created_date >= w[1].created_date));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn bulk_delete_is_all_or_nothing() {
    let (store, path) = fresh("bulk");
    let ids: Vec<String> = (0..3)
        .map(|i| store.create("invoices", fields(json!({ "n": i }))).unwrap().id)
        .collect();

    let err = store
        .bulk_delete("invoices", &[ids[0].clone(), "ghost-1".into(), "ghost-2".into()])
        .unwrap_err();
    match err {
        Error::NotFound { id, .. } => assert_eq!(id, "ghost-1, ghost-2"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(store.list("invoices").unwrap().len(), 3);

    assert_eq!(store.bulk_delete("invoices", &ids[..2]).unwrap(), 2);
    let left = store.list("invoices").unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, ids[2]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn import_upserts_by_id() {
    let (store, path) = fresh("import");
    let mut existing = store.create("platforms", fields(json!({ "name": "Old" }))).unwrap();
    existing.fields.insert("name".into(), json!("New"));
    let extra = cashpot::Record::create("platforms", fields(json!({ "name": "Extra" })));

    let written = store
        .import("platforms", vec![existing.clone(), extra.clone()])
        .unwrap();
    assert_eq!(written, 2);
    let list = store.list("platforms").unwrap();
    assert_eq!(list, vec![existing, extra]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn any_entity_name_is_accepted() {
    let (store, path) = fresh("free_names");
    store.create("notes", fields(json!({ "text": "hi" }))).unwrap();
    assert_eq!(store.snapshot().unwrap()["notes"].len(), 1);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn concurrent_creates_do_not_drop_records() {
    let (store, path) = fresh("concurrent");
    let store = Arc::new(store);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store
                        .create("slotMachines", fields(json!({ "serial_number": format!("{t}-{i}") })))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.list("slotMachines").unwrap().len(), 80);
    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.list("slotMachines").unwrap().len(), 80);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn company_lifecycle() {
    let (store, path) = fresh("lifecycle");
    let acme = store.create("companies", fields(json!({ "name": "Acme" }))).unwrap();
    assert!(store.list("companies").unwrap().iter().any(|r| r.id == acme.id));

    store
        .update("companies", &acme.id, fields(json!({ "email": "hq@acme.test" })))
        .unwrap();
    let listed = store.list("companies").unwrap();
    let found = listed.iter().find(|r| r.id == acme.id).unwrap();
    assert_eq!(found.str_field("email"), Some("hq@acme.test"));
    assert_eq!(found.str_field("name"), Some("Acme"));

    store.delete("companies", &acme.id).unwrap();
    assert!(store.list("companies").unwrap().iter().all(|r| r.id != acme.id));
    let _ = std::fs::remove_file(&path);
}
