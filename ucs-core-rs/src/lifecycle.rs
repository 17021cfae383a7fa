//! Classification of lifecycle events
//!
//! Pure predicates over [`EventPayload`] answering whether a device or entity
//! just appeared or went away.

use crate::events::{ElementChange, EventData, EventPayload, EventType};

/// A remote device was connected
pub fn is_device_connected(payload: &EventPayload) -> bool {
    payload.device.is_some()
        && payload.event_type == EventType::DeviceChange
        && payload.change_type == ElementChange::Add
}

/// A remote device was disconnected
pub fn is_device_disconnected(payload: &EventPayload) -> bool {
    payload.device.is_some()
        && payload.event_type == EventType::DeviceChange
        && payload.change_type == ElementChange::Remove
}

/// A remote entity was added
pub fn is_entity_added(payload: &EventPayload) -> bool {
    payload.entity.is_some()
        && payload.event_type == EventType::EntityChange
        && payload.change_type == ElementChange::Add
}

/// A remote entity was removed
pub fn is_entity_removed(payload: &EventPayload) -> bool {
    payload.entity.is_some()
        && payload.event_type == EventType::EntityChange
        && payload.change_type == ElementChange::Remove
}

/// A remote device updated its node management use case data
pub fn is_use_case_data_update(payload: &EventPayload) -> bool {
    payload.device.is_some()
        && payload.event_type == EventType::DataChange
        && payload.change_type == ElementChange::Update
        && matches!(payload.data, Some(EventData::UseCaseData(_)))
}
