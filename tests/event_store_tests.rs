//! Event Store Integration Tests
//!
//! Tests for the event log flow including:
//! - Append and load round trips
//! - Optimistic concurrency between competing writers
//! - Typed payload decoding through the event data factory
//! - Namespace isolation and clearing

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use es_filestore::{
    ErrorKind, Event, EventDataFactory, EventStore, EventStoreError, Namespace, StoreBase,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderCreated {
    customer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ItemAdded {
    sku: String,
    quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum OrderEvent {
    Created(OrderCreated),
    ItemAdded(ItemAdded),
}

fn order_factory() -> EventDataFactory<OrderEvent> {
    EventDataFactory::new()
        .register("order_created", OrderEvent::Created)
        .register("item_added", OrderEvent::ItemAdded)
}

fn setup_store() -> (EventStore<OrderEvent>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = EventStore::new(StoreBase::new(dir.path()), order_factory());
    (store, dir)
}

fn created(id: Uuid, version: u64) -> Event<OrderEvent> {
    Event::new(
        id,
        "Order",
        "order_created",
        version,
        OrderEvent::Created(OrderCreated {
            customer: "alice".to_string(),
        }),
    )
}

fn item_added(id: Uuid, version: u64, sku: &str) -> Event<OrderEvent> {
    Event::new(
        id,
        "Order",
        "item_added",
        version,
        OrderEvent::ItemAdded(ItemAdded {
            sku: sku.to_string(),
            quantity: 1,
        }),
    )
}

fn ns(name: &str) -> Namespace {
    Namespace::new(name).unwrap()
}

#[test]
fn test_save_then_load_in_two_batches() {
    let (store, _dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();

    let first = created(id, 1);
    let second = item_added(id, 2, "sku-1");
    store.save(&ns, &[first.clone()], 0).unwrap();
    store.save(&ns, &[second.clone()], 1).unwrap();

    let loaded = store.load(&ns, id).unwrap();
    assert_eq!(loaded, vec![first, second]);
    assert_eq!(store.version(&ns, id).unwrap(), 2);
}

#[test]
fn test_round_trip_keeps_envelope() {
    let (store, _dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();

    let events = vec![
        created(id, 1).with_metadata("user", "bob"),
        item_added(id, 2, "a"),
        item_added(id, 3, "b"),
    ];
    store.save(&ns, &events, 0).unwrap();

    let loaded = store.load(&ns, id).unwrap();
    assert_eq!(loaded.len(), 3);
    for (saved, loaded) in events.iter().zip(&loaded) {
        assert_eq!(loaded.aggregate_id, saved.aggregate_id);
        assert_eq!(loaded.aggregate_type, saved.aggregate_type);
        assert_eq!(loaded.event_type, saved.event_type);
        assert_eq!(loaded.version, saved.version);
        assert_eq!(loaded.timestamp, saved.timestamp);
        assert_eq!(loaded.data, saved.data);
    }
    assert_eq!(loaded[0].metadata["user"], "bob");
}

#[test]
fn test_fresh_aggregate_with_wrong_original_version() {
    let (store, dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();

    let err = store.save(&ns, &[created(id, 2)], 1).unwrap_err();
    assert!(err.is_version_conflict());
    assert!(matches!(
        err,
        EventStoreError::VersionConflict { expected: 1, actual: 0, .. }
    ));
    assert!(!dir.path().join("shop").join(format!("{}.json", id)).exists());
}

#[test]
fn test_stale_writer_is_rejected() {
    let (store, _dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();

    store.save(&ns, &[created(id, 1)], 0).unwrap();
    store.save(&ns, &[item_added(id, 2, "a")], 1).unwrap();

    let err = store.save(&ns, &[item_added(id, 2, "b")], 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert!(err.kind().is_retryable());

    let loaded = store.load(&ns, id).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(
        loaded[1].data,
        OrderEvent::ItemAdded(ItemAdded { sku: "a".into(), quantity: 1 })
    );
}

#[test]
fn test_racing_writers_on_same_version() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(EventStore::new(StoreBase::new(dir.path()), order_factory()));
    let ns = ns("race");
    let id = Uuid::new_v4();
    store.save(&ns, &[created(id, 1)], 0).unwrap();

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let mut handles = Vec::new();
    for i in 0..writers {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let ns = ns.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            store.save(&ns, &[item_added(id, 2, &format!("sku-{}", i))], 1)
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(EventStoreError::is_version_conflict));

    assert_eq!(store.version(&ns, id).unwrap(), 2);
    assert_eq!(store.load(&ns, id).unwrap().len(), 2);
}

#[test]
fn test_load_unknown_aggregate_is_empty() {
    let (store, _dir) = setup_store();
    let ns = ns("shop");

    assert!(store.load(&ns, Uuid::new_v4()).unwrap().is_empty());
    assert_eq!(store.version(&ns, Uuid::new_v4()).unwrap(), 0);
}

#[test]
fn test_invalid_batches_write_nothing() {
    let (store, dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();

    let err = store.save(&ns, &[], 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = store
        .save(&ns, &[created(id, 1), item_added(id, 3, "gap")], 0)
        .unwrap_err();
    assert!(matches!(
        err,
        EventStoreError::IncorrectEventVersion { expected: 2, actual: 3, .. }
    ));

    let other = Uuid::new_v4();
    let err = store
        .save(&ns, &[created(id, 1), item_added(other, 2, "x")], 0)
        .unwrap_err();
    assert!(matches!(err, EventStoreError::InvalidEvent { .. }));

    assert!(!dir.path().join("shop").exists());
}

#[test]
fn test_unknown_event_type_fails_decode() {
    let (store, dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();
    store.save(&ns, &[created(id, 1)], 0).unwrap();

    let narrow: EventStore<OrderEvent> = EventStore::new(
        StoreBase::new(dir.path()),
        EventDataFactory::new().register("item_added", OrderEvent::ItemAdded),
    );
    let err = narrow.load(&ns, id).unwrap_err();
    assert!(matches!(err, EventStoreError::CouldNotDecode { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_dynamic_factory_reads_any_log() {
    let (store, dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();
    store
        .save(&ns, &[created(id, 1), item_added(id, 2, "a")], 0)
        .unwrap();

    let raw = EventStore::new(StoreBase::new(dir.path()), EventDataFactory::dynamic());
    let loaded = raw.load(&ns, id).unwrap();
    assert_eq!(loaded[0].data["customer"], "alice");
    assert_eq!(loaded[1].data["sku"], "a");
}

#[test]
fn test_log_is_one_line_per_event() {
    let (store, dir) = setup_store();
    let ns = ns("tenant/orders");
    let id = Uuid::new_v4();
    store
        .save(&ns, &[created(id, 1), item_added(id, 2, "a")], 0)
        .unwrap();
    store.save(&ns, &[item_added(id, 3, "b")], 2).unwrap();

    let path = dir
        .path()
        .join("tenant")
        .join("orders")
        .join(format!("{}.json", id));
    let content = fs::read_to_string(path).unwrap();
    assert!(content.ends_with('\n'));

    let versions: Vec<u64> = content
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["version"].as_u64().unwrap())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn test_corrupt_log_reports_inconsistency() {
    let (store, dir) = setup_store();
    let ns = ns("shop");
    let id = Uuid::new_v4();
    store
        .save(&ns, &[created(id, 1), item_added(id, 2, "a"), item_added(id, 3, "b")], 0)
        .unwrap();

    // Drop the middle line so version 2 is missing
    let path = dir.path().join("shop").join(format!("{}.json", id));
    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    fs::write(&path, format!("{}\n{}\n", lines[0], lines[2])).unwrap();

    let err = store.load(&ns, id).unwrap_err();
    assert!(matches!(err, EventStoreError::InconsistentLog { .. }));
    assert_eq!(err.kind(), ErrorKind::Serialization);
}

#[test]
fn test_namespaces_are_isolated() {
    let (store, _dir) = setup_store();
    let (a, b) = (ns("tenant-a"), ns("tenant-b"));
    let id = Uuid::new_v4();

    store.save(&a, &[created(id, 1)], 0).unwrap();
    assert_eq!(store.version(&a, id).unwrap(), 1);
    assert_eq!(store.version(&b, id).unwrap(), 0);

    // Same aggregate id starts its own history in another namespace
    store.save(&b, &[created(id, 1)], 0).unwrap();
    assert_eq!(store.load(&b, id).unwrap().len(), 1);
}

#[test]
fn test_clear_namespace() {
    let (store, dir) = setup_store();
    let (a, b) = (ns("tenant-a"), ns("tenant-b"));
    let id = Uuid::new_v4();
    store.save(&a, &[created(id, 1)], 0).unwrap();
    store.save(&b, &[created(id, 1)], 0).unwrap();

    store.clear(&a).unwrap();
    assert!(!dir.path().join("tenant-a").exists());
    assert!(store.load(&a, id).unwrap().is_empty());
    assert_eq!(store.load(&b, id).unwrap().len(), 1);

    // Clearing twice is fine, and the aggregate can start over
    store.clear(&a).unwrap();
    store.save(&a, &[created(id, 1)], 0).unwrap();
    assert_eq!(store.version(&a, id).unwrap(), 1);
}
