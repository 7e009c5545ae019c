//! Real-time broadcast payloads.
//!
//! Observers and the cross-instance relay channel carry the same JSON
//! envelope verbatim: `{"type": "spot_update", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AvailabilityStatus, OccupancyLevel, SpotChange};
use crate::ids::SpotId;
use crate::structs::Spot;

/// Snapshot of a spot after a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpotUpdate {
    /// The spot that changed.
    pub spot_id: SpotId,
    /// Display name.
    pub name: String,
    /// Which operation caused the change.
    pub change: SpotChange,
    /// Occupancy after the change.
    pub current_occupancy: u32,
    /// Total seats.
    pub total_capacity: u32,
    /// Crowding classification of `current_occupancy`.
    pub occupancy_level: OccupancyLevel,
    /// Latest crowd-sourced free seats.
    pub current_available: Option<u32>,
    /// Classification of `current_available`.
    pub availability_status: AvailabilityStatus,
    /// When the change was committed.
    pub updated_at: DateTime<Utc>,
}

impl SpotUpdate {
    /// Build an update from the post-commit spot state.
    pub fn from_spot(spot: &Spot, change: SpotChange) -> Self {
        Self {
            spot_id: spot.id,
            name: spot.name.clone(),
            change,
            current_occupancy: spot.current_occupancy,
            total_capacity: spot.total_capacity,
            occupancy_level: OccupancyLevel::classify(
                spot.current_occupancy,
                spot.total_capacity,
            ),
            current_available: spot.current_available,
            availability_status: AvailabilityStatus::classify(
                spot.current_available,
                spot.total_capacity,
            ),
            updated_at: spot.updated_at,
        }
    }
}

/// Tagged envelope pushed to observers and the relay topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BroadcastEnvelope {
    /// Occupancy or availability of a spot changed.
    SpotUpdate(SpotUpdate),
}

impl BroadcastEnvelope {
    /// Serialize to the JSON text sent over the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SpotId;

    fn spot() -> Spot {
        Spot {
            id: SpotId::new(),
            name: String::from("Main Library 3F"),
            latitude: 0.0,
            longitude: 0.0,
            total_capacity: 50,
            current_occupancy: 11,
            current_available: Some(30),
            last_update_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn envelope_is_tagged_spot_update() {
        let update = SpotUpdate::from_spot(&spot(), SpotChange::CheckIn);
        let json = BroadcastEnvelope::SpotUpdate(update).to_json().unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap_or_default();

        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("spot_update"));
        let data = value.get("data").cloned().unwrap_or_default();
        assert_eq!(data.get("current_occupancy").and_then(serde_json::Value::as_u64), Some(11));
        assert_eq!(data.get("change").and_then(|v| v.as_str()), Some("check_in"));
        assert_eq!(data.get("occupancy_level").and_then(|v| v.as_str()), Some("low"));
        assert_eq!(
            data.get("availability_status").and_then(|v| v.as_str()),
            Some("available")
        );
    }

    #[test]
    fn envelope_parses_back_from_relay_text() {
        let envelope = BroadcastEnvelope::SpotUpdate(SpotUpdate::from_spot(
            &spot(),
            SpotChange::Availability,
        ));
        let json = envelope.to_json().unwrap_or_default();
        let parsed: Option<BroadcastEnvelope> = serde_json::from_str(&json).ok();
        assert_eq!(parsed, Some(envelope));
    }
}
