//! Field-level overlay of override records onto seed features.

use crate::seed::SeedFeature;

use super::types::{EventRecord, EventType, MergedEvent};

/// Overlay `record` (if any) onto `seed`.
///
/// Geometry is always the seed's. Each descriptive property prefers the
/// override's value when present and falls back to the seed's field-by-field:
/// an override with no address surfaces the seed's address, not a blank.
pub fn merge_feature(seed: &SeedFeature, record: Option<&EventRecord>) -> MergedEvent {
    let props = &seed.properties;

    let Some(record) = record else {
        return MergedEvent {
            name: props.name.clone(),
            title: props.name.clone(),
            geometry: seed.geometry.clone(),
            category: props.category.clone(),
            priority: props.priority.clone(),
            date: props.date.clone(),
            description: props.description.clone(),
            location: props.location.clone(),
            address: props.address.clone(),
            start_time: None,
            end_time: None,
            max_participants: None,
            requirements: Vec::new(),
            what_to_bring: Vec::new(),
            organizer: props.organizer.clone(),
            organizer_contact: None,
            status: None,
            override_id: None,
            updated_at: None,
        };
    };

    MergedEvent {
        name: props.name.clone(),
        title: record.title.clone(),
        geometry: seed.geometry.clone(),
        category: merged_category(props, record.event_type),
        priority: props.priority.clone(),
        date: record.event_date.clone(),
        description: record.description.clone(),
        location: record.location.clone(),
        address: record.address.clone().or_else(|| props.address.clone()),
        start_time: record.start_time.clone(),
        end_time: record.end_time.clone(),
        max_participants: record.max_participants,
        requirements: record.requirements.clone(),
        what_to_bring: record.what_to_bring.clone(),
        organizer: record
            .organizer_name
            .clone()
            .or_else(|| props.organizer.clone()),
        organizer_contact: record.organizer_contact.clone(),
        status: Some(record.status),
        override_id: Some(record.id.clone()),
        updated_at: Some(record.updated_at.clone()),
    }
}

/// Seed categories outside the admin enum survive untouched when the
/// override still agrees with them; otherwise the override's type wins.
fn merged_category(props: &crate::seed::SeedProperties, event_type: EventType) -> String {
    if EventType::from_category(&props.category) == event_type {
        props.category.clone()
    } else {
        event_type.as_str().to_string()
    }
}
