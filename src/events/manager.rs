use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::seed::{SeedCollection, SeedFeature};
use crate::store::EventStore;

use super::error::EventDataError;
use super::merge::merge_feature;
use super::types::{EventPatch, EventRecord, EventStatus, EventType, MergedEvent};

/// Zero-argument callback invoked after the merged view may have changed.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Scoped subscription returned by [`EventDataManager::add_listener`].
///
/// The listener fires until the guard is dropped or explicitly
/// unsubscribed; afterwards it is guaranteed never to be invoked again.
pub struct ListenerGuard {
    key: usize,
    listeners: Arc<DashMap<usize, Listener>>,
}

impl ListenerGuard {
    pub fn unsubscribe(self) {
        // Drop removes the registration.
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.remove(&self.key);
    }
}

/// Single source of truth for "what does this event currently look like".
///
/// Reconciles the immutable seed dataset with mutable override records held
/// in an [`EventStore`], and keeps UI observers consistent through listener
/// fan-out. Constructed by the application's composition root via [`init`]
/// and shared from there; there is no hidden global instance.
///
/// The override cache is keyed by `seed_name`, the stable join key copied
/// onto each record at creation. Renaming an event's title never orphans its
/// seed feature.
///
/// [`init`]: EventDataManager::init
pub struct EventDataManager {
    store: Arc<dyn EventStore>,
    seed: SeedCollection,
    overrides: RwLock<HashMap<String, EventRecord>>,
    listeners: Arc<DashMap<usize, Listener>>,
}

impl std::fmt::Debug for EventDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDataManager").finish_non_exhaustive()
    }
}

impl EventDataManager {
    /// Build a manager and complete the first override load before returning.
    ///
    /// A failed initial load surfaces as `Persistence`; the caller decides
    /// whether to retry or to start against an empty store.
    pub async fn init(
        store: Arc<dyn EventStore>,
        seed: SeedCollection,
    ) -> Result<Self, EventDataError> {
        let records = store.list().await?;
        let mut map = HashMap::with_capacity(records.len());
        for record in records {
            map.insert(record.seed_name.clone(), record);
        }
        tracing::info!(
            overrides = map.len(),
            seed_features = seed.len(),
            "event data manager initialized"
        );
        Ok(Self {
            store,
            seed,
            overrides: RwLock::new(map),
            listeners: Arc::new(DashMap::new()),
        })
    }

    /// Full merged feature collection, in seed order. Pure function of the
    /// current cache; no I/O, safe to call on every render path.
    pub fn merged_events(&self) -> Vec<MergedEvent> {
        let overrides = self.overrides.read().expect("override cache lock poisoned");
        self.seed
            .features()
            .iter()
            .map(|feature| merge_feature(feature, overrides.get(feature.name())))
            .collect()
    }

    /// Merged feature whose seed name equals `name`, which may arrive
    /// percent-encoded from a URL path segment.
    pub fn event_by_name(&self, name: &str) -> Option<MergedEvent> {
        let name = decode_name(name);
        let feature = self.seed.feature_by_name(&name)?;
        let overrides = self.overrides.read().expect("override cache lock poisoned");
        Some(merge_feature(feature, overrides.get(feature.name())))
    }

    /// Merged feature backed by the override with the given generated id.
    /// Orphan overrides (no matching seed feature) yield `None`: there is no
    /// geometry to project them onto.
    pub fn event_by_id(&self, id: &str) -> Option<MergedEvent> {
        let overrides = self.overrides.read().expect("override cache lock poisoned");
        let record = overrides.values().find(|r| r.id == id)?;
        let feature = self.seed.feature_by_name(&record.seed_name)?;
        Some(merge_feature(feature, Some(record)))
    }

    /// Guarantee an override row exists for the named seed feature and return
    /// its generated id.
    ///
    /// Join and reminder flows need a stable id to reference; seed features
    /// alone have none. Creation goes through the store's upsert with
    /// `seed_name` as the conflict key, so concurrent callers converge on a
    /// single row and a lost race is indistinguishable from success.
    pub async fn ensure_event_exists(&self, name: &str) -> Result<String, EventDataError> {
        let name = decode_name(name);

        {
            let overrides = self.overrides.read().expect("override cache lock poisoned");
            if let Some(record) = overrides.get(name.as_str()) {
                return Ok(record.id.clone());
            }
        }

        let feature = self
            .seed
            .feature_by_name(&name)
            .ok_or_else(|| EventDataError::NotFound(format!("no seed feature named {name:?}")))?;

        let stored = self.store.upsert(seeded_record(feature)).await?;
        tracing::debug!(id = %stored.id, seed_name = %stored.seed_name, "event override ensured");

        {
            let mut overrides = self.overrides.write().expect("override cache lock poisoned");
            overrides.insert(stored.seed_name.clone(), stored.clone());
        }
        self.notify_listeners();
        Ok(stored.id)
    }

    /// Apply `patch` to the override with id `id`, persist it, and update the
    /// cache entry.
    ///
    /// The existing row is read back from the store (the authoritative copy,
    /// not the cache) so the immutable `created_by` field is preserved even
    /// if the cache is stale. `updated_at` is refreshed on every write.
    pub async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<EventRecord, EventDataError> {
        if matches!(&patch.title, Some(t) if t.trim().is_empty()) {
            return Err(EventDataError::Validation(
                "title cannot be blank".to_string(),
            ));
        }

        let existing = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EventDataError::NotFound(format!("no event override with id {id:?}")))?;

        let mut next = existing.apply_patch(&patch);
        next.updated_at = Utc::now().to_rfc3339();

        let stored = self.store.update(id, next).await?;

        {
            let mut overrides = self.overrides.write().expect("override cache lock poisoned");
            overrides.insert(stored.seed_name.clone(), stored.clone());
        }
        self.notify_listeners();
        Ok(stored)
    }

    /// Re-fetch the entire override set and replace the cache wholesale.
    ///
    /// A failed fetch is logged and leaves the previous cache intact, never
    /// partially overwritten; nobody is notified because nothing changed.
    pub async fn refresh(&self) {
        match self.store.list().await {
            Ok(records) => {
                let mut map = HashMap::with_capacity(records.len());
                for record in records {
                    map.insert(record.seed_name.clone(), record);
                }
                {
                    let mut overrides =
                        self.overrides.write().expect("override cache lock poisoned");
                    *overrides = map;
                }
                self.notify_listeners();
            }
            Err(e) => {
                tracing::warn!("event refresh failed, keeping previous data: {e}");
            }
        }
    }

    /// Register a change listener. Set semantics: the same callback (same
    /// `Arc`) registered twice occupies one slot and fires once per change.
    pub fn add_listener(&self, listener: Listener) -> ListenerGuard {
        let key = Arc::as_ptr(&listener) as *const () as usize;
        self.listeners.insert(key, listener);
        ListenerGuard {
            key,
            listeners: Arc::clone(&self.listeners),
        }
    }

    pub fn seed(&self) -> &SeedCollection {
        &self.seed
    }

    fn notify_listeners(&self) {
        // Snapshot before invoking: a listener may re-enter the manager and
        // register or drop subscriptions without deadlocking a map shard.
        let snapshot: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

/// Build the initial override row for a seed feature. `seed_name` is copied
/// here, exactly once; it never changes afterwards.
fn seeded_record(feature: &SeedFeature) -> EventRecord {
    let props = &feature.properties;
    EventRecord {
        id: Uuid::new_v4().to_string(),
        seed_name: props.name.clone(),
        title: props.name.clone(),
        description: props.description.clone(),
        event_type: EventType::from_category(&props.category),
        event_date: props.date.clone(),
        start_time: None,
        end_time: None,
        location: props.location.clone(),
        address: props.address.clone(),
        max_participants: None,
        requirements: Vec::new(),
        what_to_bring: Vec::new(),
        organizer_name: props.organizer.clone(),
        organizer_contact: None,
        status: EventStatus::Upcoming,
        created_by: None,
        updated_at: Utc::now().to_rfc3339(),
    }
}

fn decode_name(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}
