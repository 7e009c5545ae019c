//! Error types for the occupancy ledger.

use std::time::Duration;

use havn_types::SpotId;

use crate::store::StoreError;

/// Which location-sensitive write a geofence check guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceOperation {
    /// Opening an occupancy session.
    CheckIn,
    /// Reporting free seats.
    AvailabilityUpdate,
}

impl core::fmt::Display for GeofenceOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CheckIn => f.write_str("check-in"),
            Self::AvailabilityUpdate => f.write_str("availability update"),
        }
    }
}

/// Malformed input, rejected before the store is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Latitude outside `[-90, 90]` or not finite.
    #[error("latitude must be between -90 and 90, got {0}")]
    InvalidLatitude(f64),
    /// Longitude outside `[-180, 180]` or not finite.
    #[error("longitude must be between -180 and 180, got {0}")]
    InvalidLongitude(f64),
    /// Location accuracy negative or not finite.
    #[error("location accuracy must be a non-negative number of meters, got {0}")]
    InvalidAccuracy(f64),
}

/// Every way a ledger operation can fail.
///
/// All variants are produced after the unit of work has been dropped, so no
/// partial write survives any of them.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The user already has an open session.
    #[error("user is already checked in to a spot")]
    AlreadyCheckedIn,

    /// The spot does not exist.
    #[error("spot {0} not found")]
    SpotNotFound(SpotId),

    /// Check-out requested without an open session.
    #[error("no active check-in found")]
    NoActiveSession,

    /// The reported location is too far from the spot.
    #[error("{operation} requires being within {radius_m:.0} m of the spot (measured {distance_m:.1} m)")]
    GeofenceViolation {
        /// Measured distance in meters.
        distance_m: f64,
        /// Radius that was exceeded.
        radius_m: f64,
        /// The guarded operation.
        operation: GeofenceOperation,
    },

    /// Every seat of the spot is taken.
    #[error("spot {0} is at full capacity")]
    SpotFull(SpotId),

    /// Reported free seats larger than the spot's capacity.
    #[error("seats available ({seats}) cannot exceed total capacity ({capacity})")]
    SeatsExceedCapacity {
        /// Reported free seats.
        seats: u32,
        /// The spot's total capacity.
        capacity: u32,
    },

    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backing store failed.
    #[error("occupancy store error: {0}")]
    Store(#[from] StoreError),

    /// The operation did not finish within the transaction deadline.
    #[error("occupancy transaction exceeded {0:?}")]
    Timeout(Duration),
}
