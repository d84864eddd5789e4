//! Reconciliation manager behavior tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use crate::seed::SeedCollection;
use crate::store::{EventStore, MemoryEventStore, StoreChange, StoreError};

use super::manager::{EventDataManager, Listener};
use super::types::{EventPatch, EventRecord, EventStatus, EventType};

const SEED_JSON: &str = r#"{
    "features": [
        {
            "properties": {
                "name": "Beach Cleanup",
                "category": "cleanup",
                "priority": "high",
                "date": "2024-05-01",
                "description": "Monthly shoreline cleanup.",
                "location": "North Shore Beach",
                "address": null,
                "organizer": "Shoreline Alliance"
            },
            "geometry": [
                { "lat": 36.96, "lng": -122.02 },
                { "lat": 36.97, "lng": -122.01 },
                { "lat": 36.95, "lng": -122.00 },
                { "lat": 36.96, "lng": -122.02 }
            ]
        },
        {
            "properties": {
                "name": "Riverside Tree Planting",
                "category": "tree-planting",
                "priority": "medium",
                "date": "2024-05-18",
                "description": "Native willows along the east bank.",
                "location": "San Lorenzo River",
                "address": "120 River St",
                "organizer": null
            },
            "geometry": [
                { "lat": 36.97, "lng": -122.03 },
                { "lat": 36.98, "lng": -122.02 },
                { "lat": 36.96, "lng": -122.01 },
                { "lat": 36.97, "lng": -122.03 }
            ]
        }
    ]
}"#;

fn test_seed() -> SeedCollection {
    SeedCollection::from_json(SEED_JSON).expect("test seed parses")
}

fn beach_override() -> EventRecord {
    EventRecord {
        id: "u1".to_string(),
        seed_name: "Beach Cleanup".to_string(),
        title: "Beach Cleanup".to_string(),
        description: "Monthly shoreline cleanup.".to_string(),
        event_type: EventType::Cleanup,
        event_date: "2024-06-01".to_string(),
        start_time: None,
        end_time: None,
        location: "North Shore Beach".to_string(),
        address: Some("1 Shore Rd".to_string()),
        max_participants: None,
        requirements: Vec::new(),
        what_to_bring: Vec::new(),
        organizer_name: None,
        organizer_contact: None,
        status: EventStatus::Upcoming,
        created_by: Some("admin-7".to_string()),
        updated_at: "2024-04-20T10:00:00Z".to_string(),
    }
}

fn counting_listener() -> (Listener, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    let listener: Listener = Arc::new(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    (listener, count)
}

async fn manager_with(
    records: Vec<EventRecord>,
) -> (Arc<MemoryEventStore>, EventDataManager) {
    let store = Arc::new(MemoryEventStore::new());
    for record in records {
        store.insert(record).await.expect("fixture insert");
    }
    let manager = EventDataManager::init(store.clone(), test_seed())
        .await
        .expect("init");
    (store, manager)
}

// ---------------------------------------------------------------------------
// Merged reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_loads_overrides_and_merges_them() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;

    let merged = manager
        .event_by_name("Beach Cleanup")
        .expect("beach cleanup present");
    assert_eq!(merged.date, "2024-06-01");
    assert_eq!(merged.address, Some("1 Shore Rd".to_string()));
    // Other seed fields unchanged.
    assert_eq!(merged.priority, "high");
    assert_eq!(merged.organizer, Some("Shoreline Alliance".to_string()));

    // The feature with no override passes through untouched.
    let plain = manager
        .event_by_name("Riverside Tree Planting")
        .expect("tree planting present");
    assert_eq!(plain.date, "2024-05-18");
    assert_eq!(plain.override_id, None);
}

#[tokio::test]
async fn merged_events_covers_every_seed_feature_in_order() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let merged = manager.merged_events();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].name, "Beach Cleanup");
    assert_eq!(merged[1].name, "Riverside Tree Planting");
}

#[tokio::test]
async fn event_by_name_decodes_percent_encoding() {
    let (_store, manager) = manager_with(vec![]).await;
    let merged = manager
        .event_by_name("Beach%20Cleanup")
        .expect("decoded lookup succeeds");
    assert_eq!(merged.name, "Beach Cleanup");
    assert!(manager.event_by_name("No%20Such%20Event").is_none());
}

#[tokio::test]
async fn event_by_name_is_idempotent_for_unchanged_cache() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let first = manager.event_by_name("Beach Cleanup");
    let second = manager.event_by_name("Beach Cleanup");
    assert_eq!(first, second);
}

#[tokio::test]
async fn event_by_id_finds_backing_override() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let merged = manager.event_by_id("u1").expect("id lookup succeeds");
    assert_eq!(merged.name, "Beach Cleanup");
    assert!(manager.event_by_id("missing").is_none());
}

#[tokio::test]
async fn orphan_overrides_are_excluded_from_the_merged_view() {
    let mut orphan = beach_override();
    orphan.id = "u9".to_string();
    orphan.seed_name = "Retired Event".to_string();
    let (_store, manager) = manager_with(vec![orphan]).await;

    assert_eq!(manager.merged_events().len(), 2);
    assert!(manager.event_by_id("u9").is_none());
}

// ---------------------------------------------------------------------------
// ensure_event_exists
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ensure_event_exists_creates_then_reuses() {
    let (store, manager) = manager_with(vec![]).await;

    let id = manager
        .ensure_event_exists("Beach Cleanup")
        .await
        .expect("first ensure");
    let again = manager
        .ensure_event_exists("Beach%20Cleanup")
        .await
        .expect("second ensure");
    assert_eq!(id, again);
    assert_eq!(store.list().await.unwrap().len(), 1);

    let record = store.get(&id).await.unwrap().expect("row exists");
    assert_eq!(record.seed_name, "Beach Cleanup");
    assert_eq!(record.event_type, EventType::Cleanup);
    assert_eq!(record.status, EventStatus::Upcoming);
}

#[tokio::test]
async fn ensure_event_exists_converges_across_managers() {
    // Two managers over the same store, both cold for this feature: the
    // loser's upsert conflicts on seed_name and gets the winner's row back.
    let store = Arc::new(MemoryEventStore::new());
    let a = EventDataManager::init(store.clone(), test_seed()).await.unwrap();
    let b = EventDataManager::init(store.clone(), test_seed()).await.unwrap();

    let id_a = a.ensure_event_exists("Beach Cleanup").await.unwrap();
    let id_b = b.ensure_event_exists("Beach Cleanup").await.unwrap();
    assert_eq!(id_a, id_b);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ensure_event_exists_rejects_unknown_names() {
    let (_store, manager) = manager_with(vec![]).await;
    let err = manager
        .ensure_event_exists("Imaginary Gala")
        .await
        .expect_err("no such seed feature");
    assert!(matches!(err, super::EventDataError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// update_event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_event_patches_and_notifies_exactly_once() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let (listener, count) = counting_listener();
    let _guard = manager.add_listener(listener);

    let patch = EventPatch {
        event_date: Some("2024-07-04".to_string()),
        max_participants: Some(25),
        ..EventPatch::default()
    };
    let stored = manager.update_event("u1", patch).await.expect("update");
    assert_eq!(stored.event_date, "2024-07-04");
    assert_eq!(stored.created_by, Some("admin-7".to_string()));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let merged = manager.event_by_name("Beach Cleanup").unwrap();
    assert_eq!(merged.date, "2024-07-04");
    assert_eq!(merged.max_participants, Some(25));
}

#[tokio::test]
async fn update_event_title_rename_keeps_the_seed_join() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;

    let patch = EventPatch {
        title: Some("Spring Shore Sweep".to_string()),
        ..EventPatch::default()
    };
    manager.update_event("u1", patch).await.expect("rename");

    // The join key is seed_name, not title: the seed feature still carries
    // its override after the rename.
    let merged = manager.event_by_name("Beach Cleanup").unwrap();
    assert_eq!(merged.title, "Spring Shore Sweep");
    assert_eq!(merged.override_id, Some("u1".to_string()));
}

#[tokio::test]
async fn update_event_unknown_id_is_not_found_and_silent() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let before = manager.merged_events();
    let (listener, count) = counting_listener();
    let _guard = manager.add_listener(listener);

    let err = manager
        .update_event("nope", EventPatch::default())
        .await
        .expect_err("unknown id");
    assert!(matches!(err, super::EventDataError::NotFound(_)));
    assert_eq!(manager.merged_events(), before);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn update_event_rejects_blank_title() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let patch = EventPatch {
        title: Some("   ".to_string()),
        ..EventPatch::default()
    };
    let err = manager.update_event("u1", patch).await.expect_err("blank");
    assert!(matches!(err, super::EventDataError::Validation(_)));
}

// ---------------------------------------------------------------------------
// refresh and failure semantics
// ---------------------------------------------------------------------------

/// Wraps the in-memory store with a read-failure switch.
struct FlakyStore {
    inner: MemoryEventStore,
    fail_reads: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryEventStore::new(),
            fail_reads: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn list(&self) -> Result<Vec<EventRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        self.inner.list().await
    }

    async fn get(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn insert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        self.inner.insert(record).await
    }

    async fn update(&self, id: &str, record: EventRecord) -> Result<EventRecord, StoreError> {
        self.inner.update(id, record).await
    }

    async fn upsert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        self.inner.upsert(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.watch()
    }
}

#[tokio::test]
async fn refresh_picks_up_writes_made_behind_the_manager() {
    let (store, manager) = manager_with(vec![]).await;
    assert!(manager.event_by_name("Beach Cleanup").unwrap().override_id.is_none());

    store.insert(beach_override()).await.unwrap();
    manager.refresh().await;

    let merged = manager.event_by_name("Beach Cleanup").unwrap();
    assert_eq!(merged.override_id, Some("u1".to_string()));
    assert_eq!(merged.date, "2024-06-01");
}

#[tokio::test]
async fn failed_refresh_keeps_previous_state_and_stays_silent() {
    let store = Arc::new(FlakyStore::new());
    store.inner.insert(beach_override()).await.unwrap();
    let manager = EventDataManager::init(store.clone(), test_seed())
        .await
        .expect("init while healthy");

    let before = manager.merged_events();
    let (listener, count) = counting_listener();
    let _guard = manager.add_listener(listener);

    // Mutate the store, then cut reads: the failed refresh must not clear
    // or partially overwrite the cache, and must notify nobody.
    store
        .inner
        .update("u1", {
            let mut r = beach_override();
            r.event_date = "2024-09-01".to_string();
            r
        })
        .await
        .unwrap();
    store.set_failing(true);
    manager.refresh().await;

    assert_eq!(manager.merged_events(), before);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_failing_refresh_equals_first_successful_one() {
    let store = Arc::new(FlakyStore::new());
    let manager = EventDataManager::init(store.clone(), test_seed())
        .await
        .unwrap();

    store.inner.insert(beach_override()).await.unwrap();
    manager.refresh().await;
    let after_first = manager.merged_events();

    store.set_failing(true);
    manager.refresh().await;
    assert_eq!(manager.merged_events(), after_first);
}

#[tokio::test]
async fn init_propagates_a_failed_first_load() {
    let store = Arc::new(FlakyStore::new());
    store.set_failing(true);
    let err = EventDataManager::init(store, test_seed())
        .await
        .expect_err("first load failed");
    assert!(matches!(err, super::EventDataError::Persistence(_)));
}

// ---------------------------------------------------------------------------
// Listener registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribed_listeners_never_fire_again() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let (listener, count) = counting_listener();
    let guard = manager.add_listener(listener);

    manager
        .update_event("u1", EventPatch::default())
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    guard.unsubscribe();
    manager
        .update_event("u1", EventPatch::default())
        .await
        .unwrap();
    manager.refresh().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn same_callback_registered_twice_fires_once() {
    let (_store, manager) = manager_with(vec![beach_override()]).await;
    let (listener, count) = counting_listener();
    let _g1 = manager.add_listener(Arc::clone(&listener));
    let _g2 = manager.add_listener(listener);

    manager
        .update_event("u1", EventPatch::default())
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_mutation_and_refresh_notifies() {
    let (_store, manager) = manager_with(vec![]).await;
    let (listener, count) = counting_listener();
    let _guard = manager.add_listener(listener);

    manager.ensure_event_exists("Beach Cleanup").await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    manager.refresh().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}
