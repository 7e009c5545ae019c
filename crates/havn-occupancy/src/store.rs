//! Persistence seam for the occupancy ledger.
//!
//! A [`UnitOfWork`] is one transaction scoped to one user. Opening it takes
//! that user's exclusive lock, so two concurrent check-ins by the same user
//! are serialized: the second one sees the first one's committed record and
//! fails. Dropping a unit of work without calling [`UnitOfWork::commit`]
//! rolls back every write made through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use havn_types::{
    AvailabilityReport, OccupancyRecord, OccupancyRecordId, Spot, SpotId, UserId, UserPresence,
};

/// Failures of the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection, pool or transaction failure. Retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A uniqueness constraint rejected the write.
    #[error("constraint conflict: {0}")]
    Conflict(String),
    /// A row could not be decoded or an expected row vanished.
    #[error("corrupt store state: {0}")]
    Corrupt(String),
}

/// A transactional store of spots, occupancy records and user presence.
#[async_trait]
pub trait OccupancyStore: Send + Sync + 'static {
    /// Open a unit of work holding `user`'s exclusive lock.
    ///
    /// Waits while another unit of work holds the same user's lock.
    async fn begin(&self, user: UserId) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Non-locking read of a spot.
    async fn spot(&self, id: SpotId) -> Result<Option<Spot>, StoreError>;

    /// Non-locking read of a user's presence.
    async fn presence(&self, user: UserId) -> Result<UserPresence, StoreError>;
}

/// One atomic, user-scoped transaction.
#[async_trait]
pub trait UnitOfWork: Send {
    /// The locked user's `checked_in` record, if any.
    async fn active_record(&mut self) -> Result<Option<OccupancyRecord>, StoreError>;

    /// Read a spot inside the transaction.
    async fn spot(&mut self, id: SpotId) -> Result<Option<Spot>, StoreError>;

    /// Append a new record. Fails with [`StoreError::Conflict`] if the user
    /// already has a `checked_in` record.
    async fn insert_record(&mut self, record: &OccupancyRecord) -> Result<(), StoreError>;

    /// Add one to the spot's occupancy and return the updated spot. Fails
    /// with [`StoreError::Conflict`] if the spot is already at capacity.
    async fn increment_occupancy(&mut self, id: SpotId, at: DateTime<Utc>)
    -> Result<Spot, StoreError>;

    /// Subtract one from the spot's occupancy, stopping at zero, and return
    /// the updated spot.
    async fn decrement_occupancy_clamped(
        &mut self,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError>;

    /// Transition a record to `checked_out`.
    async fn close_record(
        &mut self,
        id: OccupancyRecordId,
        checked_out_at: DateTime<Utc>,
        session_duration_secs: i64,
    ) -> Result<(), StoreError>;

    /// Overwrite the locked user's presence.
    async fn set_presence(&mut self, presence: &UserPresence) -> Result<(), StoreError>;

    /// Overwrite the spot's advertised free seats and return the updated spot.
    async fn set_availability(
        &mut self,
        id: SpotId,
        seats_available: u32,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError>;

    /// Append an availability report to the audit trail.
    async fn record_availability_report(
        &mut self,
        report: &AvailabilityReport,
    ) -> Result<(), StoreError>;

    /// Make every write of this unit durable and release the user's lock.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
