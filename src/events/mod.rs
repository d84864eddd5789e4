//! Event-data reconciliation: seed features overlaid with live admin edits.
//!
//! The manager here is the only stateful piece of the crate. Everything a
//! consumer renders goes through [`EventDataManager::merged_events`] or one of
//! the single-feature lookups, so the map, detail, and profile views stay
//! consistent without sharing a parent state tree.

mod error;
mod manager;
mod merge;
mod types;

#[cfg(test)]
mod tests;

pub use error::EventDataError;
pub use manager::{EventDataManager, Listener, ListenerGuard};
pub use merge::merge_feature;
pub use types::{EventPatch, EventRecord, EventStatus, EventType, MergedEvent};
