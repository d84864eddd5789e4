//! Event-data reconciliation core for a map-based community events platform.
//!
//! The platform renders local environmental events (cleanups, tree plantings,
//! community gardens) on a map. The baseline dataset ships with the build;
//! administrators edit events through a hosted record store. This crate owns
//! the one piece with real design tension: merging those two sources into a
//! single consistent view and keeping every mounted consumer in sync.
//!
//! # Architecture
//!
//! - `seed`: the immutable, build-time feature dataset (geometry + properties)
//! - `events`: the reconciliation manager: merged reads, idempotent override
//!   creation, patch updates, wholesale refresh, listener fan-out
//! - `store`: the record-store seam (`EventStore`) plus SQLite and in-memory
//!   implementations with a realtime change feed
//!
//! The manager is constructed explicitly via [`events::EventDataManager::init`]
//! and shared from the application's composition root; there is no global
//! instance. Consumers subscribe to the store's change feed and respond to a
//! notice by calling `refresh()`; the store is the source of truth and the
//! in-memory view is a cache rebuilt wholesale, never a delta log.

pub mod events;
pub mod seed;
pub mod store;

pub use events::{
    EventDataError, EventDataManager, EventPatch, EventRecord, EventStatus, EventType, Listener,
    ListenerGuard, MergedEvent,
};
pub use seed::{Coordinate, SeedCollection, SeedFeature, SeedProperties};
pub use store::{
    ChangeKind, EventStore, MemoryEventStore, SqliteEventStore, StoreChange, StoreError,
};
