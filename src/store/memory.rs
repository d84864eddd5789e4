use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::EventRecord;

use super::{ChangeFeed, ChangeKind, EventStore, StoreChange, StoreError};

/// In-memory store: same contract and change feed as the SQLite store, no
/// durability. Used by unit tests and ephemeral deployments.
pub struct MemoryEventStore {
    rows: RwLock<HashMap<String, EventRecord>>,
    feed: ChangeFeed,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }

    fn seed_name_taken(rows: &HashMap<String, EventRecord>, seed_name: &str) -> Option<String> {
        rows.values()
            .find(|r| r.seed_name == seed_name)
            .map(|r| r.id.clone())
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn list(&self) -> Result<Vec<EventRecord>, StoreError> {
        let rows = self.rows.read().expect("row map lock poisoned");
        let mut records: Vec<EventRecord> = rows.values().cloned().collect();
        records.sort_by(|a, b| a.seed_name.cmp(&b.seed_name));
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        let rows = self.rows.read().expect("row map lock poisoned");
        Ok(rows.get(id).cloned())
    }

    async fn insert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        {
            let mut rows = self.rows.write().expect("row map lock poisoned");
            if rows.contains_key(&record.id) {
                return Err(StoreError::Conflict(format!(
                    "duplicate id {:?}",
                    record.id
                )));
            }
            if Self::seed_name_taken(&rows, &record.seed_name).is_some() {
                return Err(StoreError::Conflict(format!(
                    "duplicate seed_name {:?}",
                    record.seed_name
                )));
            }
            rows.insert(record.id.clone(), record.clone());
        }
        self.feed.publish(&record.id, ChangeKind::Inserted);
        Ok(record)
    }

    async fn update(&self, id: &str, record: EventRecord) -> Result<EventRecord, StoreError> {
        let stored = {
            let mut rows = self.rows.write().expect("row map lock poisoned");
            let existing = rows
                .get(id)
                .ok_or_else(|| StoreError::NotFound(format!("no row with id {id:?}")))?;

            // id, seed_name, and created_by are immutable columns.
            let mut next = record;
            next.id = existing.id.clone();
            next.seed_name = existing.seed_name.clone();
            next.created_by = existing.created_by.clone();
            rows.insert(next.id.clone(), next.clone());
            next
        };
        self.feed.publish(&stored.id, ChangeKind::Updated);
        Ok(stored)
    }

    async fn upsert(&self, record: EventRecord) -> Result<EventRecord, StoreError> {
        let (stored, inserted) = {
            let mut rows = self.rows.write().expect("row map lock poisoned");
            if let Some(existing_id) = Self::seed_name_taken(&rows, &record.seed_name) {
                // Conflict on the declared key is success: return the row
                // that won.
                let existing = rows
                    .get(&existing_id)
                    .cloned()
                    .expect("index points at a live row");
                (existing, false)
            } else {
                rows.insert(record.id.clone(), record.clone());
                (record, true)
            }
        };
        if inserted {
            self.feed.publish(&stored.id, ChangeKind::Inserted);
        }
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut rows = self.rows.write().expect("row map lock poisoned");
            rows.remove(id).is_some()
        };
        if removed {
            self.feed.publish(id, ChangeKind::Deleted);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}
