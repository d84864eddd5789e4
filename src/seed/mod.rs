//! Build-time seed dataset: the map's baseline event features.
//!
//! Seed features are immutable. Each one has a human-readable `name` that is
//! unique within the dataset and a polygon footprint the map renders. Live
//! edits never touch these records; they overlay them (see `events::merge`).

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// A single polygon vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Descriptive properties of a seed feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedProperties {
    pub name: String,
    pub category: String,
    pub priority: String,
    pub date: String,
    pub description: String,
    pub location: String,
    pub address: Option<String>,
    pub organizer: Option<String>,
}

/// An immutable geographic event record bundled at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFeature {
    pub properties: SeedProperties,
    /// Ordered polygon ring; first and last vertex coincide.
    pub geometry: Vec<Coordinate>,
}

impl SeedFeature {
    pub fn name(&self) -> &str {
        &self.properties.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCollection {
    features: Vec<SeedFeature>,
}

const BUNDLED_JSON: &str = include_str!("../../data/seed_events.json");

static BUNDLED: OnceLock<SeedCollection> = OnceLock::new();

impl SeedCollection {
    /// The dataset compiled into the binary. Parsed once; a malformed bundle
    /// is a build artifact defect, not a runtime condition.
    pub fn bundled() -> &'static SeedCollection {
        BUNDLED.get_or_init(|| {
            serde_json::from_str(BUNDLED_JSON).expect("bundled seed dataset is valid JSON")
        })
    }

    /// Parse a collection from JSON. Used by tests and by hosts that ship
    /// their own baseline dataset.
    pub fn from_json(json: &str) -> Result<SeedCollection, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn features(&self) -> &[SeedFeature] {
        &self.features
    }

    pub fn feature_by_name(&self, name: &str) -> Option<&SeedFeature> {
        self.features.iter().find(|f| f.properties.name == name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
