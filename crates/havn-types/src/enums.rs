//! Enumeration types for the Havn occupancy service.
//!
//! Every enum serializes in `snake_case`, which is the wire format the
//! mobile client and the database `TEXT` columns both use.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Occupancy session status
// ---------------------------------------------------------------------------

/// Lifecycle state of an [`OccupancyRecord`](crate::OccupancyRecord).
///
/// A record is created as `CheckedIn` and transitions exactly once to
/// `CheckedOut`. Records are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OccupancyStatus {
    /// The user currently occupies the spot.
    CheckedIn,
    /// The session has been closed.
    CheckedOut,
}

impl OccupancyStatus {
    /// The database / wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
        }
    }

    /// Parse the database representation back into a status.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "checked_in" => Some(Self::CheckedIn),
            "checked_out" => Some(Self::CheckedOut),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Occupancy level (how crowded a spot is)
// ---------------------------------------------------------------------------

/// Coarse crowding classification derived from occupancy and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OccupancyLevel {
    /// At most a third full.
    Low,
    /// At most two thirds full.
    Moderate,
    /// More than two thirds full.
    High,
}

impl OccupancyLevel {
    /// Integer occupancy percentage (`current * 100 / capacity`).
    ///
    /// A spot with zero capacity reports 0 %.
    pub fn percentage(current: u32, capacity: u32) -> u32 {
        let scaled = u64::from(current).saturating_mul(100);
        let percent = scaled.checked_div(u64::from(capacity)).unwrap_or(0);
        u32::try_from(percent).unwrap_or(u32::MAX)
    }

    /// Classify a spot's crowding from its occupancy counter.
    pub fn classify(current: u32, capacity: u32) -> Self {
        match Self::percentage(current, capacity) {
            0..=33 => Self::Low,
            34..=66 => Self::Moderate,
            _ => Self::High,
        }
    }
}

// ---------------------------------------------------------------------------
// Availability status (crowd-sourced free seats)
// ---------------------------------------------------------------------------

/// Classification of the last reported free-seat count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AvailabilityStatus {
    /// More than half the seats are free.
    Available,
    /// More than a fifth of the seats are free.
    Low,
    /// A fifth or fewer of the seats are free.
    Full,
    /// Nobody has reported availability yet.
    Unknown,
}

impl AvailabilityStatus {
    /// Classify a reported free-seat count against total capacity.
    pub fn classify(available: Option<u32>, capacity: u32) -> Self {
        let Some(available) = available else {
            return Self::Unknown;
        };
        let free = u64::from(available).saturating_mul(100);
        let capacity = u64::from(capacity);
        if free > capacity.saturating_mul(50) {
            Self::Available
        } else if free > capacity.saturating_mul(20) {
            Self::Low
        } else {
            Self::Full
        }
    }
}

// ---------------------------------------------------------------------------
// Noise level (optional part of an availability report)
// ---------------------------------------------------------------------------

/// Reporter's perception of the noise at a spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum NoiseLevel {
    /// Library quiet.
    Quiet,
    /// Conversation level.
    Moderate,
    /// Hard to concentrate.
    Loud,
}

impl NoiseLevel {
    /// The database / wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Moderate => "moderate",
            Self::Loud => "loud",
        }
    }
}

// ---------------------------------------------------------------------------
// Spot change kind (what triggered a real-time update)
// ---------------------------------------------------------------------------

/// The write operation that produced a [`SpotUpdate`](crate::SpotUpdate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SpotChange {
    /// A user checked in.
    CheckIn,
    /// A user checked out.
    CheckOut,
    /// A user reported free seats.
    Availability,
}
