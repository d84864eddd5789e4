use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Cleanup,
    TreePlanting,
    CommunityGarden,
    HabitatRestoration,
    Education,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Cleanup => "cleanup",
            EventType::TreePlanting => "tree-planting",
            EventType::CommunityGarden => "community-garden",
            EventType::HabitatRestoration => "habitat-restoration",
            EventType::Education => "education",
            EventType::Other => "other",
        }
    }

    /// Map a seed category label onto the enum. Labels the admin schema does
    /// not know collapse to `Other` rather than failing the merge.
    pub fn from_category(category: &str) -> EventType {
        match category {
            "cleanup" => EventType::Cleanup,
            "tree-planting" => EventType::TreePlanting,
            "community-garden" => EventType::CommunityGarden,
            "habitat-restoration" => EventType::HabitatRestoration,
            "education" => EventType::Education,
            _ => EventType::Other,
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cleanup" => Ok(EventType::Cleanup),
            "tree-planting" => Ok(EventType::TreePlanting),
            "community-garden" => Ok(EventType::CommunityGarden),
            "habitat-restoration" => Ok(EventType::HabitatRestoration),
            "education" => Ok(EventType::Education),
            "other" => Ok(EventType::Other),
            _ => Err(format!("unknown event type {s:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(EventStatus::Upcoming),
            "ongoing" => Ok(EventStatus::Ongoing),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            _ => Err(format!("unknown event status {s:?}")),
        }
    }
}

/// A mutable, store-backed event record authored or edited by an admin.
///
/// `seed_name` is copied from the matching seed feature exactly once, at
/// creation, and is the only key used to join the record back onto the seed
/// dataset. `title` is free to change afterwards without orphaning the
/// feature. `created_by` is immutable after creation; updates preserve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub seed_name: String,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub event_date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub max_participants: Option<u32>,
    pub requirements: Vec<String>,
    pub what_to_bring: Vec<String>,
    pub organizer_name: Option<String>,
    pub organizer_contact: Option<String>,
    pub status: EventStatus,
    pub created_by: Option<String>,
    pub updated_at: String,
}

/// Partial update applied over an existing record. `None` leaves the field
/// untouched; for the `Option`-typed record fields, `Some(None)`-style
/// clearing is intentionally not expressible; admin edits only ever set or
/// keep values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub max_participants: Option<u32>,
    pub requirements: Option<Vec<String>>,
    pub what_to_bring: Option<Vec<String>>,
    pub organizer_name: Option<String>,
    pub organizer_contact: Option<String>,
    pub status: Option<EventStatus>,
}

impl EventRecord {
    /// Apply `patch` field-by-field, keeping `id`, `seed_name`, and
    /// `created_by` fixed. The caller refreshes `updated_at`.
    pub fn apply_patch(&self, patch: &EventPatch) -> EventRecord {
        let mut next = self.clone();
        if let Some(v) = &patch.title {
            next.title = v.clone();
        }
        if let Some(v) = &patch.description {
            next.description = v.clone();
        }
        if let Some(v) = patch.event_type {
            next.event_type = v;
        }
        if let Some(v) = &patch.event_date {
            next.event_date = v.clone();
        }
        if let Some(v) = &patch.start_time {
            next.start_time = Some(v.clone());
        }
        if let Some(v) = &patch.end_time {
            next.end_time = Some(v.clone());
        }
        if let Some(v) = &patch.location {
            next.location = v.clone();
        }
        if let Some(v) = &patch.address {
            next.address = Some(v.clone());
        }
        if let Some(v) = patch.max_participants {
            next.max_participants = Some(v);
        }
        if let Some(v) = &patch.requirements {
            next.requirements = v.clone();
        }
        if let Some(v) = &patch.what_to_bring {
            next.what_to_bring = v.clone();
        }
        if let Some(v) = &patch.organizer_name {
            next.organizer_name = Some(v.clone());
        }
        if let Some(v) = &patch.organizer_contact {
            next.organizer_contact = Some(v.clone());
        }
        if let Some(v) = patch.status {
            next.status = v;
        }
        next
    }
}

/// The runtime overlay of an override onto its seed feature.
///
/// Read-only projection computed on demand; geometry always comes from the
/// seed (overrides never carry geometry).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedEvent {
    /// The seed feature's immutable name.
    pub name: String,
    /// Display title: the override's when one exists, else the seed name.
    pub title: String,
    pub geometry: Vec<crate::seed::Coordinate>,
    pub category: String,
    pub priority: String,
    pub date: String,
    pub description: String,
    pub location: String,
    pub address: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_participants: Option<u32>,
    pub requirements: Vec<String>,
    pub what_to_bring: Vec<String>,
    pub organizer: Option<String>,
    pub organizer_contact: Option<String>,
    pub status: Option<EventStatus>,
    /// Generated id of the backing override, when one exists. Join and
    /// reminder flows need this.
    pub override_id: Option<String>,
    pub updated_at: Option<String>,
}
