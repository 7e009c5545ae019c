//! Core entity structs for the Havn occupancy service.
//!
//! `Spot`, `OccupancyRecord`, `UserPresence` and `AvailabilityReport` mirror
//! the persistent rows the ledger reads and writes. `SpotSummary` is the
//! compact projection returned to API callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{NoiseLevel, OccupancyStatus};
use crate::ids::{AvailabilityReportId, OccupancyRecordId, SpotId, UserId};

// ---------------------------------------------------------------------------
// Spot
// ---------------------------------------------------------------------------

/// A physical location with finite capacity.
///
/// `current_occupancy` is only ever changed through the occupancy ledger and
/// never drops below zero. `current_available` is the crowd-sourced free-seat
/// count from the most recent availability report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Spot {
    /// Unique spot identifier.
    pub id: SpotId,
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Total number of seats.
    pub total_capacity: u32,
    /// Number of users currently checked in.
    pub current_occupancy: u32,
    /// Free seats according to the latest availability report.
    pub current_available: Option<u32>,
    /// When the latest availability report was written.
    pub last_update_at: Option<DateTime<Utc>>,
    /// When any field of the spot last changed.
    pub updated_at: DateTime<Utc>,
}

impl Spot {
    /// The compact projection used in API responses.
    pub fn summary(&self) -> SpotSummary {
        SpotSummary {
            id: self.id,
            name: self.name.clone(),
            current_occupancy: self.current_occupancy,
        }
    }
}

/// Compact spot projection: `{id, name, current_occupancy}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpotSummary {
    /// Spot identifier.
    pub id: SpotId,
    /// Display name.
    pub name: String,
    /// Occupancy after the operation that produced this summary.
    pub current_occupancy: u32,
}

// ---------------------------------------------------------------------------
// OccupancyRecord
// ---------------------------------------------------------------------------

/// One check-in session. Append-only: records are closed, never deleted.
///
/// At most one record per user is in [`OccupancyStatus::CheckedIn`] at any
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OccupancyRecord {
    /// Record identifier.
    pub id: OccupancyRecordId,
    /// The user who checked in.
    pub user_id: UserId,
    /// The spot checked into.
    pub spot_id: SpotId,
    /// Session state.
    pub status: OccupancyStatus,
    /// Start of the session.
    pub checked_in_at: DateTime<Utc>,
    /// End of the session, once checked out.
    pub checked_out_at: Option<DateTime<Utc>>,
    /// Session length in whole seconds, once checked out.
    pub session_duration_secs: Option<i64>,
    /// Reported GPS accuracy in meters at check-in.
    pub location_accuracy: f64,
}

impl OccupancyRecord {
    /// Whether the session is still open.
    pub fn is_active(&self) -> bool {
        self.status == OccupancyStatus::CheckedIn
    }
}

// ---------------------------------------------------------------------------
// UserPresence
// ---------------------------------------------------------------------------

/// The part of a user profile that tracks where the user is checked in.
///
/// Written in the same unit of work as the user's active record, so the two
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserPresence {
    /// The user.
    pub user_id: UserId,
    /// Spot the user is checked into, if any.
    pub current_spot_id: Option<SpotId>,
    /// When the current session started, if any.
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl UserPresence {
    /// Presence of a user who is not checked in anywhere.
    pub const fn absent(user_id: UserId) -> Self {
        Self {
            user_id,
            current_spot_id: None,
            checked_in_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AvailabilityReport
// ---------------------------------------------------------------------------

/// A crowd-sourced free-seat report. Append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AvailabilityReport {
    /// Report identifier.
    pub id: AvailabilityReportId,
    /// Reported spot.
    pub spot_id: SpotId,
    /// Reporting user.
    pub user_id: UserId,
    /// Free seats observed.
    pub seats_available: u32,
    /// Perceived noise, if given.
    pub noise_level: Option<NoiseLevel>,
    /// Photo of the spot, if given.
    pub photo_url: Option<String>,
    /// Reporter latitude in degrees.
    pub user_latitude: f64,
    /// Reporter longitude in degrees.
    pub user_longitude: f64,
    /// Measured distance between reporter and spot in meters.
    pub distance_m: f64,
    /// When the report was written.
    pub created_at: DateTime<Utc>,
}
