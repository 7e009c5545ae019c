//! Row types for the occupancy tables and their conversion into domain types.
//!
//! Counts are stored as `INTEGER` and exposed as `u32`; a negative value in
//! the database is reported as [`StoreError::Corrupt`] rather than wrapped.

use chrono::{DateTime, Utc};
use havn_occupancy::StoreError;
use havn_types::{OccupancyRecord, OccupancyStatus, Spot, UserPresence};
use uuid::Uuid;

/// A row from the `spots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SpotRow {
    /// Spot UUID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Total seats.
    pub total_capacity: i32,
    /// Users currently checked in.
    pub current_occupancy: i32,
    /// Latest reported free seats.
    pub current_available: Option<i32>,
    /// Latest availability report time.
    pub last_update_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SpotRow> for Spot {
    type Error = StoreError;

    fn try_from(row: SpotRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            total_capacity: count(row.total_capacity, "total_capacity")?,
            current_occupancy: count(row.current_occupancy, "current_occupancy")?,
            current_available: row
                .current_available
                .map(|seats| count(seats, "current_available"))
                .transpose()?,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            last_update_at: row.last_update_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `occupancy_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OccupancyRecordRow {
    /// Record UUID.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Target spot.
    pub spot_id: Uuid,
    /// `checked_in` or `checked_out`.
    pub status: String,
    /// Session start.
    pub checked_in_at: DateTime<Utc>,
    /// Session end.
    pub checked_out_at: Option<DateTime<Utc>>,
    /// Session length in seconds.
    pub session_duration_secs: Option<i64>,
    /// Reported GPS accuracy in meters.
    pub location_accuracy: f64,
}

impl TryFrom<OccupancyRecordRow> for OccupancyRecord {
    type Error = StoreError;

    fn try_from(row: OccupancyRecordRow) -> Result<Self, Self::Error> {
        let status = OccupancyStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("record {} has status {:?}", row.id, row.status))
        })?;
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            spot_id: row.spot_id.into(),
            status,
            checked_in_at: row.checked_in_at,
            checked_out_at: row.checked_out_at,
            session_duration_secs: row.session_duration_secs,
            location_accuracy: row.location_accuracy,
        })
    }
}

/// A row from the `user_presence` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresenceRow {
    /// The user.
    pub user_id: Uuid,
    /// Spot the user is checked into.
    pub current_spot_id: Option<Uuid>,
    /// Session start.
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl From<PresenceRow> for UserPresence {
    fn from(row: PresenceRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            current_spot_id: row.current_spot_id.map(Into::into),
            checked_in_at: row.checked_in_at,
        }
    }
}

/// Convert an `INTEGER` count column to `u32`.
fn count(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|err| StoreError::Corrupt(format!("{column} = {value}: {err}")))
}

/// Convert a `u32` count to the `INTEGER` bind type.
pub fn to_db_count(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|err| StoreError::Corrupt(format!("count {value} does not fit INTEGER: {err}")))
}
