//! Occupancy bookkeeping for the Havn service.
//!
//! This crate owns the rules that decide whether a user may check into a
//! spot, check out of it, or report its free seats. It knows nothing about
//! HTTP or PostgreSQL: persistence goes through the [`OccupancyStore`] seam.
//!
//! # Modules
//!
//! - [`geo`] -- Haversine distance and coordinate validation.
//! - [`confidence`] -- Time-decayed confidence of availability reports.
//! - [`store`] -- The [`OccupancyStore`] / [`UnitOfWork`] traits.
//! - [`memory`] -- [`MemoryStore`], an in-process store with undo-log rollback.
//! - [`ledger`] -- [`OccupancyLedger`]: check-in, check-out, availability, status.
//! - [`error`] -- [`LedgerError`], the typed outcome of every ledger call.
//!
//! # Invariants
//!
//! - At most one `checked_in` record per user. Enforced by the unit of work,
//!   which holds the user's lock from the first read until commit.
//! - A spot's occupancy never drops below zero and never exceeds capacity.
//! - Any early exit (error, timeout, cancelled future) drops the unit of work
//!   uncommitted, which rolls every write back.

pub mod confidence;
pub mod error;
pub mod geo;
pub mod ledger;
pub mod memory;
pub mod store;

pub use confidence::confidence_score;
pub use error::{GeofenceOperation, LedgerError, ValidationError};
pub use geo::{Coordinate, EARTH_RADIUS_M, haversine_distance};
pub use ledger::{
    AvailabilityOutcome, AvailabilityRequest, CheckInOutcome, CheckInRequest, CheckOutOutcome,
    LedgerConfig, OccupancyLedger, SpotStatus, format_session_duration,
};
pub use memory::MemoryStore;
pub use store::{OccupancyStore, StoreError, UnitOfWork};
