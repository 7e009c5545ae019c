//! `PostgreSQL` persistence for the Havn occupancy ledger.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration and embedded migrations
//! - [`occupancy_store`] -- [`PgOccupancyStore`], the `PostgreSQL`
//!   implementation of [`havn_occupancy::OccupancyStore`]
//! - [`rows`] -- Row types and their conversion into domain types
//! - [`error`] -- [`DbError`] and the `sqlx` to store error mapping
//!
//! # Locking
//!
//! Every unit of work starts by upserting the caller's `user_presence` row
//! and selecting it `FOR UPDATE`. Concurrent units for the same user queue
//! on that row lock, so the active-session read and the record insert of a
//! check-in can never interleave with another check-in by the same user.
//! The partial unique index on `occupancy_records (user_id) WHERE status =
//! 'checked_in'` backs this up at the schema level.

pub mod error;
pub mod occupancy_store;
pub mod postgres;
pub mod rows;

pub use error::DbError;
pub use occupancy_store::PgOccupancyStore;
pub use postgres::{PostgresConfig, PostgresPool};
