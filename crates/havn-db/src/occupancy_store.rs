//! `PostgreSQL` implementation of [`OccupancyStore`].
//!
//! A [`PgUnit`] owns one `sqlx` transaction. Dropping it without commit
//! makes `sqlx` roll the transaction back when the connection returns to
//! the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use havn_occupancy::{OccupancyStore, StoreError, UnitOfWork};
use havn_types::{
    AvailabilityReport, NoiseLevel, OccupancyRecord, OccupancyRecordId, Spot, SpotId, UserId,
    UserPresence,
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::SqlxResultExt;
use crate::rows::{OccupancyRecordRow, PresenceRow, SpotRow, to_db_count};

/// Occupancy store backed by a [`PgPool`].
#[derive(Debug, Clone)]
pub struct PgOccupancyStore {
    pool: PgPool,
}

impl PgOccupancyStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a spot, or overwrite its descriptive fields if it exists.
    ///
    /// Occupancy and availability of an existing spot are left untouched.
    pub async fn upsert_spot(&self, spot: &Spot) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO spots (id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
              ON CONFLICT (id) DO UPDATE
              SET name = EXCLUDED.name,
                  latitude = EXCLUDED.latitude,
                  longitude = EXCLUDED.longitude,
                  total_capacity = EXCLUDED.total_capacity,
                  updated_at = EXCLUDED.updated_at",
        )
        .bind(spot.id.into_inner())
        .bind(&spot.name)
        .bind(spot.latitude)
        .bind(spot.longitude)
        .bind(to_db_count(spot.total_capacity)?)
        .bind(to_db_count(spot.current_occupancy)?)
        .bind(spot.current_available.map(to_db_count).transpose()?)
        .bind(spot.last_update_at)
        .bind(spot.updated_at)
        .execute(&self.pool)
        .await
        .into_store()?;
        Ok(())
    }

    /// All records of a user, newest first.
    pub async fn records_for_user(&self, user: UserId) -> Result<Vec<OccupancyRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OccupancyRecordRow>(
            r"SELECT id, user_id, spot_id, status, checked_in_at, checked_out_at, session_duration_secs, location_accuracy
              FROM occupancy_records
              WHERE user_id = $1
              ORDER BY checked_in_at DESC",
        )
        .bind(user.into_inner())
        .fetch_all(&self.pool)
        .await
        .into_store()?;
        rows.into_iter().map(OccupancyRecord::try_from).collect()
    }
}

#[async_trait]
impl OccupancyStore for PgOccupancyStore {
    async fn begin(&self, user: UserId) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await.into_store()?;

        sqlx::query(
            r"INSERT INTO user_presence (user_id) VALUES ($1)
              ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user.into_inner())
        .execute(&mut *tx)
        .await
        .into_store()?;

        sqlx::query(r"SELECT user_id FROM user_presence WHERE user_id = $1 FOR UPDATE")
            .bind(user.into_inner())
            .execute(&mut *tx)
            .await
            .into_store()?;

        Ok(Box::new(PgUnit { tx, user }))
    }

    async fn spot(&self, id: SpotId) -> Result<Option<Spot>, StoreError> {
        let row = sqlx::query_as::<_, SpotRow>(
            r"SELECT id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at
              FROM spots WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .into_store()?;
        row.map(Spot::try_from).transpose()
    }

    async fn presence(&self, user: UserId) -> Result<UserPresence, StoreError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            r"SELECT user_id, current_spot_id, checked_in_at FROM user_presence WHERE user_id = $1",
        )
        .bind(user.into_inner())
        .fetch_optional(&self.pool)
        .await
        .into_store()?;
        Ok(row.map_or_else(|| UserPresence::absent(user), UserPresence::from))
    }
}

/// One ledger transaction, holding the user's `user_presence` row lock.
struct PgUnit {
    tx: Transaction<'static, Postgres>,
    user: UserId,
}

impl PgUnit {
    async fn returning_spot(
        &mut self,
        query: &'static str,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let row = sqlx::query_as::<_, SpotRow>(query)
            .bind(id.into_inner())
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .into_store()?
            .ok_or_else(|| StoreError::Corrupt(format!("spot {id} vanished mid-transaction")))?;
        Spot::try_from(row)
    }
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn active_record(&mut self) -> Result<Option<OccupancyRecord>, StoreError> {
        let row = sqlx::query_as::<_, OccupancyRecordRow>(
            r"SELECT id, user_id, spot_id, status, checked_in_at, checked_out_at, session_duration_secs, location_accuracy
              FROM occupancy_records
              WHERE user_id = $1 AND status = 'checked_in'
              LIMIT 1",
        )
        .bind(self.user.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .into_store()?;
        row.map(OccupancyRecord::try_from).transpose()
    }

    async fn spot(&mut self, id: SpotId) -> Result<Option<Spot>, StoreError> {
        let row = sqlx::query_as::<_, SpotRow>(
            r"SELECT id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at
              FROM spots WHERE id = $1
              FOR UPDATE",
        )
        .bind(id.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .into_store()?;
        row.map(Spot::try_from).transpose()
    }

    async fn insert_record(&mut self, record: &OccupancyRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO occupancy_records (id, user_id, spot_id, status, checked_in_at, checked_out_at, session_duration_secs, location_accuracy)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id.into_inner())
        .bind(record.user_id.into_inner())
        .bind(record.spot_id.into_inner())
        .bind(record.status.as_str())
        .bind(record.checked_in_at)
        .bind(record.checked_out_at)
        .bind(record.session_duration_secs)
        .bind(record.location_accuracy)
        .execute(&mut *self.tx)
        .await
        .into_store()?;
        Ok(())
    }

    async fn increment_occupancy(
        &mut self,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let row = sqlx::query_as::<_, SpotRow>(
            r"UPDATE spots
              SET current_occupancy = current_occupancy + 1, updated_at = $2
              WHERE id = $1 AND current_occupancy < total_capacity
              RETURNING id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at",
        )
        .bind(id.into_inner())
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .into_store()?
        .ok_or_else(|| StoreError::Conflict(format!("spot {id} is at capacity or missing")))?;
        Spot::try_from(row)
    }

    async fn decrement_occupancy_clamped(
        &mut self,
        id: SpotId,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        self.returning_spot(
            r"UPDATE spots
              SET current_occupancy = GREATEST(current_occupancy - 1, 0), updated_at = $2
              WHERE id = $1
              RETURNING id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at",
            id,
            at,
        )
        .await
    }

    async fn close_record(
        &mut self,
        id: OccupancyRecordId,
        checked_out_at: DateTime<Utc>,
        session_duration_secs: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"UPDATE occupancy_records
              SET status = 'checked_out', checked_out_at = $2, session_duration_secs = $3
              WHERE id = $1 AND status = 'checked_in'",
        )
        .bind(id.into_inner())
        .bind(checked_out_at)
        .bind(session_duration_secs)
        .execute(&mut *self.tx)
        .await
        .into_store()?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "record {id} was not checked_in when closing"
            )));
        }
        Ok(())
    }

    async fn set_presence(&mut self, presence: &UserPresence) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO user_presence (user_id, current_spot_id, checked_in_at, updated_at)
              VALUES ($1, $2, $3, now())
              ON CONFLICT (user_id) DO UPDATE
              SET current_spot_id = EXCLUDED.current_spot_id,
                  checked_in_at = EXCLUDED.checked_in_at,
                  updated_at = now()",
        )
        .bind(presence.user_id.into_inner())
        .bind(presence.current_spot_id.map(SpotId::into_inner))
        .bind(presence.checked_in_at)
        .execute(&mut *self.tx)
        .await
        .into_store()?;
        Ok(())
    }

    async fn set_availability(
        &mut self,
        id: SpotId,
        seats_available: u32,
        at: DateTime<Utc>,
    ) -> Result<Spot, StoreError> {
        let row = sqlx::query_as::<_, SpotRow>(
            r"UPDATE spots
              SET current_available = $2, last_update_at = $3, updated_at = $3
              WHERE id = $1
              RETURNING id, name, latitude, longitude, total_capacity, current_occupancy, current_available, last_update_at, updated_at",
        )
        .bind(id.into_inner())
        .bind(to_db_count(seats_available)?)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .into_store()?
        .ok_or_else(|| StoreError::Corrupt(format!("spot {id} vanished mid-transaction")))?;
        Spot::try_from(row)
    }

    async fn record_availability_report(
        &mut self,
        report: &AvailabilityReport,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO spot_updates (id, spot_id, user_id, seats_available, noise_level, photo_url, user_latitude, user_longitude, distance_m, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(report.id.into_inner())
        .bind(report.spot_id.into_inner())
        .bind(report.user_id.into_inner())
        .bind(to_db_count(report.seats_available)?)
        .bind(report.noise_level.map(NoiseLevel::as_str))
        .bind(report.photo_url.as_deref())
        .bind(report.user_latitude)
        .bind(report.user_longitude)
        .bind(report.distance_m)
        .bind(report.created_at)
        .execute(&mut *self.tx)
        .await
        .into_store()?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let unit = *self;
        unit.tx.commit().await.into_store()
    }
}
