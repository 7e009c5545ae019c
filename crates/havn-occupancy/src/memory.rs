//! In-process [`OccupancyStore`].
//!
//! Writes are applied eagerly to the shared state and recorded in an undo
//! log. A unit of work dropped without commit replays the log in reverse.
//! Undo steps are relative (an increment is undone by a decrement), so a
//! rollback never clobbers a concurrent unit's committed change to the same
//! spot. Per-user mutual exclusion comes from an async mutex per user id,
//! held by the unit of work until it is dropped; the mutex is forgotten once
//! no unit holds or awaits it. Capacity is re-checked under the state lock
//! on every increment, so concurrent units for different users cannot push a
//! spot past `total_capacity`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use havn_types::{
    AvailabilityReport, AvailabilityReportId, OccupancyRecord, OccupancyRecordId,
    OccupancyStatus, Spot, SpotId, UserId, UserPresence,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::store::{OccupancyStore, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct State {
    spots: HashMap<SpotId, Spot>,
    records: HashMap<OccupancyRecordId, OccupancyRecord>,
    presence: HashMap<UserId, UserPresence>,
    reports: Vec<AvailabilityReport>,
}

impl State {
    fn spot_mut(&mut self, id: SpotId) -> Result<&mut Spot, StoreError> {
        self.spots
            .get_mut(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("spot {id} vanished mid-transaction")))
    }

    fn revert(&mut self, step: Undo) {
        match step {
            Undo::Incremented(id) => {
                if let Some(spot) = self.spots.get_mut(&id) {
                    spot.current_occupancy = spot.current_occupancy.saturating_sub(1);
                }
            }
            Undo::Decremented(id) => {
                if let Some(spot) = self.spots.get_mut(&id) {
                    spot.current_occupancy = spot.current_occupancy.saturating_add(1);
                }
            }
            Undo::Availability {
                spot: id,
                previous_available,
                previous_update,
                written_at,
            } => {
                // Only restore if no later report has overwritten ours.
                if let Some(spot) = self.spots.get_mut(&id)
                    && spot.last_update_at == Some(written_at)
                {
                    spot.current_available = previous_available;
                    spot.last_update_at = previous_update;
                }
            }
            Undo::InsertedRecord(id) => {
                self.records.remove(&id);
            }
            Undo::ClosedRecord(previous) => {
                self.records.insert(previous.id, *previous);
            }
            Undo::Presence { user, previous } => match previous {
                Some(presence) => {
                    self.presence.insert(user, presence);
                }
                None => {
                    self.presence.remove(&user);
                }
            },
            Undo::Report(id) => self.reports.retain(|report| report.id != id),
        }
    }
}

#[derive(Debug)]
enum Undo {
    Incremented(SpotId),
    Decremented(SpotId),
    Availability {
        spot: SpotId,
        previous_available: Option<u32>,
        previous_update: Option<DateTime<Utc>>,
        written_at: DateTime<Utc>,
    },
    InsertedRecord(OccupancyRecordId),
    ClosedRecord(Box<OccupancyRecord>),
    Presence {
        user: UserId,
        previous: Option<UserPresence>,
    },
    Report(AvailabilityReportId),
}

fn lock_state(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, StoreError> {
    state
        .lock()
        .map_err(|poisoned| StoreError::Unavailable(format!("memory store poisoned: {poisoned}")))
}

/// An [`OccupancyStore`] held entirely in memory.
///
/// Cloning is cheap and every clone shares the same state. Used by tests and
/// for local runs without PostgreSQL.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    user_locks: Arc<Mutex<UserLocks>>,
}

type UserLocks = HashMap<UserId, Arc<AsyncMutex<()>>>;

fn lock_users(locks: &Mutex<UserLocks>) -> Result<MutexGuard<'_, UserLocks>, StoreError> {
    locks
        .lock()
        .map_err(|poisoned| StoreError::Unavailable(format!("user lock table poisoned: {poisoned}")))
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the given spots.
    pub fn with_spots(spots: impl IntoIterator<Item = Spot>) -> Self {
        let state = State {
            spots: spots.into_iter().map(|spot| (spot.id, spot)).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            user_locks: Arc::default(),
        }
    }

    /// Insert or replace a spot.
    pub fn insert_spot(&self, spot: Spot) -> Result<(), StoreError> {
        lock_state(&self.state)?.spots.insert(spot.id, spot);
        Ok(())
    }

    /// Every occupancy record, oldest first.
    pub fn records(&self) -> Result<Vec<OccupancyRecord>, StoreError> {
        let state = lock_state(&self.state)?;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by_key(|record| record.checked_in_at);
        Ok(records)
    }

    /// Every availability report, in insertion order.
    pub fn availability_reports(&self) -> Result<Vec<AvailabilityReport>, StoreError> {
        Ok(lock_state(&self.state)?.reports.clone())
    }

    fn user_lock(&self, user: UserId) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        Ok(Arc::clone(lock_users(&self.user_locks)?.entry(user).or_default()))
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        lock_users(&self.user_locks).map_or(0, |locks| locks.len())
    }
}

#[async_trait]
impl OccupancyStore for MemoryStore {
    async fn begin(&self, user: UserId) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let lock = self.user_lock(user)?;
        let guard = lock.lock_owned().await;
        Ok(Box::new(MemoryUnit {
            state: Arc::clone(&self.state),
            user_locks: Arc::clone(&self.user_locks),
            user,
            undo: Vec::new(),
            committed: false,
            user_guard: guard,
        }))
    }

    async fn spot(&self, id: SpotId) -> Result<Option<Spot>, StoreError> {
        Ok(lock_state(&self.state)?.spots.get(&id).cloned())
    }

    async fn presence(&self, user: UserId) -> Result<UserPresence, StoreError> {
        Ok(lock_state(&self.state)?
            .presence
            .get(&user)
            .cloned()
            .unwrap_or_else(|| UserPresence::absent(user)))
    }
}

struct MemoryUnit {
    state: Arc<Mutex<State>>,
    user_locks: Arc<Mutex<UserLocks>>,
    user: UserId,
    undo: Vec<Undo>,
    committed: bool,
    // Released after `Drop::drop` has replayed the undo log.
    user_guard: OwnedMutexGuard<()>,
}

impl MemoryUnit {
    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        lock_state(&self.state)
    }

    fn rollback(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        let steps = self.undo.len();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for step in self.undo.drain(..).rev() {
            state.revert(step);
        }
        debug!(user = %self.user, steps, "memory unit of work rolled back");
    }

    /// Drop the user's mutex from the table when the table and this unit
    /// are its only holders. Waiters hold their own clone, so a contended
    /// lock is never removed.
    fn forget_user_lock(&self) {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ours = OwnedMutexGuard::mutex(&self.user_guard);
        let idle = locks
            .get(&self.user)
            .is_some_and(|entry| Arc::ptr_eq(entry, ours) && Arc::strong_count(ours) == 2);
        if idle {
            locks.remove(&self.user);
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn active_record(&mut self) -> Result<Option<OccupancyRecord>, StoreError> {
        let user = self.user;
        Ok(self
            .state()?
            .records
            .values()
            .find(|record| record.user_id == user && record.is_active())
            .cloned())
    }

    async fn spot(&mut self, id: SpotId) -> Result<Option<Spot>, StoreError> {
        Ok(self.state()?.spots.get(&id).cloned())
    }

    async fn insert_record(&mut self, record: &OccupancyRecord) -> Result<(), StoreError> {
        {
            let mut state = self.state()?;
            if state.records.contains_key(&record.id) {
                return Err(StoreError::Conflict(format!("record {} exists", record.id)));
            }
            let duplicate_active = record.is_active()
                && state
                    .records
                    .values()
                    .any(|r| r.user_id == record.user_id && r.is_active());
            if duplicate_active {
                return Err(StoreError::Conflict(format!(
                    "user {} already has a checked_in record",
                    record.user_id
                )));
            }
            state.records.insert(record.id, record.clone());
        }
        self.undo.push(Undo::InsertedRecord(record.id));
        Ok(())
    }

    async fn increment_occupancy(
        &mut self,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let updated = {
            let mut state = self.state()?;
            let spot = state.spot_mut(id)?;
            if spot.current_occupancy >= spot.total_capacity {
                return Err(StoreError::Conflict(format!(
                    "spot {id} is at capacity ({})",
                    spot.total_capacity
                )));
            }
            spot.current_occupancy = spot
                .current_occupancy
                .checked_add(1)
                .ok_or_else(|| StoreError::Corrupt(format!("occupancy overflow on spot {id}")))?;
            spot.updated_at = at;
            spot.clone()
        };
        self.undo.push(Undo::Incremented(id));
        Ok(updated)
    }

    async fn decrement_occupancy_clamped(
        &mut self,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let (updated, changed) = {
            let mut state = self.state()?;
            let spot = state.spot_mut(id)?;
            let changed = match spot.current_occupancy.checked_sub(1) {
                Some(lower) => {
                    spot.current_occupancy = lower;
                    true
                }
                None => false,
            };
            spot.updated_at = at;
            (spot.clone(), changed)
        };
        if changed {
            self.undo.push(Undo::Decremented(id));
        }
        Ok(updated)
    }

    async fn close_record(
        &mut self,
        id: OccupancyRecordId,
        checked_out_at: DateTime<Utc>,
        session_duration_secs: i64,
    ) -> Result<(), StoreError> {
        let previous = {
            let mut state = self.state()?;
            let record = state
                .records
                .get_mut(&id)
                .ok_or_else(|| StoreError::Corrupt(format!("record {id} vanished mid-transaction")))?;
            let previous = record.clone();
            record.status = OccupancyStatus::CheckedOut;
            record.checked_out_at = Some(checked_out_at);
            record.session_duration_secs = Some(session_duration_secs);
            previous
        };
        self.undo.push(Undo::ClosedRecord(Box::new(previous)));
        Ok(())
    }

    async fn set_presence(&mut self, presence: &UserPresence) -> Result<(), StoreError> {
        let previous = self
            .state()?
            .presence
            .insert(presence.user_id, presence.clone());
        self.undo.push(Undo::Presence {
            user: presence.user_id,
            previous,
        });
        Ok(())
    }

    async fn set_availability(
        &mut self,
        id: SpotId,
        seats_available: u32,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let (updated, undo) = {
            let mut state = self.state()?;
            let spot = state.spot_mut(id)?;
            let undo = Undo::Availability {
                spot: id,
                previous_available: spot.current_available,
                previous_update: spot.last_update_at,
                written_at: at,
            };
            spot.current_available = Some(seats_available);
            spot.last_update_at = Some(at);
            spot.updated_at = at;
            (spot.clone(), undo)
        };
        self.undo.push(undo);
        Ok(updated)
    }

    async fn record_availability_report(
        &mut self,
        report: &AvailabilityReport,
    ) -> Result<(), StoreError> {
        self.state()?.reports.push(report.clone());
        self.undo.push(Undo::Report(report.id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut unit = self;
        unit.committed = true;
        unit.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryUnit {
    fn drop(&mut self) {
        self.rollback();
        self.forget_user_lock();
    }
}
