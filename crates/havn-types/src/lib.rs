//! Shared type definitions for the Havn occupancy service.
//!
//! This crate is the single source of truth for the domain types used across
//! the workspace. Types flow downstream to `TypeScript` via `ts-rs` so the
//! mobile client decodes the same shapes the backend produces.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Session status, occupancy and availability classifications
//! - [`structs`] -- Spots, occupancy records, user presence, availability reports
//! - [`events`] -- The real-time `spot_update` payload and its envelope

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AvailabilityStatus, NoiseLevel, OccupancyLevel, OccupancyStatus, SpotChange};
pub use events::{BroadcastEnvelope, SpotUpdate};
pub use ids::{AvailabilityReportId, OccupancyRecordId, SpotId, UserId};
pub use structs::{AvailabilityReport, OccupancyRecord, Spot, SpotSummary, UserPresence};
