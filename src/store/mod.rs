//! The record-store seam.
//!
//! `EventStore` is the contract the reconciliation core consumes: CRUD over
//! override records plus a realtime change feed. The hosted backend the
//! deployed app talks to satisfies the same shape; this crate ships a SQLite
//! implementation and an in-memory one.

mod memory;
mod sqlite;


pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::events::EventRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("column encoding: {0}")]
    Encoding(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A row-change notice pushed to `watch()` subscribers.
///
/// Deliberately opaque about the new row contents: consumers reconcile by
/// calling `EventDataManager::refresh()`, never by patching deltas in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreChange {
    pub id: String,
    pub kind: ChangeKind,
}

/// External record store as consumed by the core.
///
/// `insert` rejects a duplicate id or `seed_name` with `Conflict`. `upsert`
/// declares `seed_name` as its conflict key and returns the stored row on
/// conflict, so concurrent at-least-once creation converges on one record.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list(&self) -> Result<Vec<EventRecord>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<EventRecord>, StoreError>;
    async fn insert(&self, record: EventRecord) -> Result<EventRecord, StoreError>;
    async fn update(&self, id: &str, record: EventRecord) -> Result<EventRecord, StoreError>;
    async fn upsert(&self, record: EventRecord) -> Result<EventRecord, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Subscribe to row changes. Each write publishes one `StoreChange` after
    /// it is durable.
    fn watch(&self) -> broadcast::Receiver<StoreChange>;
}

const FEED_CAPACITY: usize = 256;

/// Broadcast fan-out shared by the store implementations.
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub(crate) fn publish(&self, id: &str, kind: ChangeKind) {
        let change = StoreChange {
            id: id.to_string(),
            kind,
        };
        if let Err(e) = self.tx.send(change) {
            tracing::debug!("change feed publish dropped (no receivers): {e}");
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }
}
