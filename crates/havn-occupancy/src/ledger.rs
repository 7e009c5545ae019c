//! The occupancy ledger: validated, atomic check-in, check-out and
//! availability writes.
//!
//! Every write runs inside one [`UnitOfWork`](crate::store::UnitOfWork)
//! scoped to the calling user, bounded by [`LedgerConfig::transaction_timeout`].
//! The unit is committed only after the last write succeeds. Any other exit
//! drops it, which rolls back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use havn_types::{
    AvailabilityReport, AvailabilityReportId, AvailabilityStatus, NoiseLevel, OccupancyLevel,
    OccupancyRecord, OccupancyRecordId, OccupancyStatus, Spot, SpotId, UserId, UserPresence,
};
use tracing::{info, warn};

use crate::confidence::confidence_score;
use crate::error::{GeofenceOperation, LedgerError, ValidationError};
use crate::geo::{Coordinate, haversine_distance};
use crate::store::{OccupancyStore, StoreError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables of the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Maximum distance in meters between user and spot for check-in.
    pub check_in_radius_m: f64,
    /// Maximum distance in meters between reporter and spot for an
    /// availability update.
    pub availability_radius_m: f64,
    /// Advisory session length after which the client should check out.
    pub auto_checkout_after: TimeDelta,
    /// Upper bound on a single ledger operation, store waits included.
    pub transaction_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            check_in_radius_m: 200.0,
            availability_radius_m: 100.0,
            auto_checkout_after: TimeDelta::hours(4),
            transaction_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Input of [`OccupancyLedger::check_in`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInRequest {
    /// Spot to check into.
    pub spot_id: SpotId,
    /// Reported latitude in degrees.
    pub latitude: f64,
    /// Reported longitude in degrees.
    pub longitude: f64,
    /// Reported GPS accuracy in meters.
    pub location_accuracy: f64,
}

/// Result of a committed check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInOutcome {
    /// The new `checked_in` record.
    pub record: OccupancyRecord,
    /// The spot after the increment.
    pub spot: Spot,
    /// When the client should consider the session expired. Not enforced.
    pub auto_checkout_at: DateTime<Utc>,
}

/// Result of a committed check-out.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutOutcome {
    /// The closed record.
    pub record: OccupancyRecord,
    /// The spot after the clamped decrement.
    pub spot: Spot,
    /// When the session was closed.
    pub checked_out_at: DateTime<Utc>,
    /// Session length in whole seconds.
    pub session_duration_secs: i64,
}

impl CheckOutOutcome {
    /// Session length as `HH:MM:SS`.
    pub fn formatted_duration(&self) -> String {
        format_session_duration(self.session_duration_secs)
    }
}

/// Input of [`OccupancyLedger::update_availability`].
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityRequest {
    /// Spot being reported on.
    pub spot_id: SpotId,
    /// Free seats observed.
    pub seats_available: u32,
    /// Perceived noise.
    pub noise_level: Option<NoiseLevel>,
    /// Photo of the spot.
    pub photo_url: Option<String>,
    /// Reporter latitude in degrees.
    pub latitude: f64,
    /// Reporter longitude in degrees.
    pub longitude: f64,
}

/// Result of a committed availability update.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityOutcome {
    /// The spot after the update.
    pub spot: Spot,
    /// The appended report.
    pub report: AvailabilityReport,
    /// Classification of the new free-seat count.
    pub availability_status: AvailabilityStatus,
    /// Confidence of the new figure (fresh, so 100).
    pub confidence: u8,
}

/// Read-only snapshot returned by [`OccupancyLedger::spot_status`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpotStatus {
    /// The spot.
    pub spot: Spot,
    /// `current_occupancy * 100 / total_capacity`.
    pub occupancy_percentage: u32,
    /// Crowding classification.
    pub occupancy_level: OccupancyLevel,
    /// Free-seat classification.
    pub availability_status: AvailabilityStatus,
    /// Time-decayed confidence of the free-seat figure.
    pub confidence: u8,
}

/// Format a session length in seconds as `HH:MM:SS`.
///
/// Negative input is treated as zero. Hours are not wrapped at 24.
pub fn format_session_duration(secs: i64) -> String {
    let total = u64::try_from(secs).unwrap_or(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Reject `location` if it lies further than `radius_m` from the spot.
/// Returns the measured distance otherwise.
fn check_geofence(
    location: Coordinate,
    spot: &Spot,
    radius_m: f64,
    operation: GeofenceOperation,
) -> Result<f64, LedgerError> {
    let distance_m = haversine_distance(location, Coordinate::of_spot(spot));
    if distance_m > radius_m {
        return Err(LedgerError::GeofenceViolation {
            distance_m,
            radius_m,
            operation,
        });
    }
    Ok(distance_m)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The transactional core of the service.
///
/// Cheap to clone: the store is shared behind an [`Arc`].
#[derive(Clone)]
pub struct OccupancyLedger {
    store: Arc<dyn OccupancyStore>,
    config: LedgerConfig,
}

impl core::fmt::Debug for OccupancyLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OccupancyLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OccupancyLedger {
    /// Create a ledger over `store`.
    pub fn new(store: Arc<dyn OccupancyStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// The active configuration.
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open an occupancy session for `user` at the requested spot.
    ///
    /// Fails with [`LedgerError::AlreadyCheckedIn`], [`LedgerError::SpotNotFound`],
    /// [`LedgerError::GeofenceViolation`] or [`LedgerError::SpotFull`] without
    /// changing anything.
    pub async fn check_in(
        &self,
        user: UserId,
        request: &CheckInRequest,
    ) -> Result<CheckInOutcome, LedgerError> {
        let location = Coordinate::new(request.latitude, request.longitude)?;
        if !request.location_accuracy.is_finite() || request.location_accuracy < 0.0 {
            return Err(ValidationError::InvalidAccuracy(request.location_accuracy).into());
        }
        self.bounded("check_in", self.check_in_inner(user, request, location))
            .await
    }

    async fn check_in_inner(
        &self,
        user: UserId,
        request: &CheckInRequest,
        location: Coordinate,
    ) -> Result<CheckInOutcome, LedgerError> {
        let mut unit = self.store.begin(user).await?;

        if unit.active_record().await?.is_some() {
            return Err(LedgerError::AlreadyCheckedIn);
        }
        let spot = unit
            .spot(request.spot_id)
            .await?
            .ok_or(LedgerError::SpotNotFound(request.spot_id))?;
        check_geofence(
            location,
            &spot,
            self.config.check_in_radius_m,
            GeofenceOperation::CheckIn,
        )?;
        if spot.current_occupancy >= spot.total_capacity {
            return Err(LedgerError::SpotFull(spot.id));
        }

        let now = Utc::now();
        let record = OccupancyRecord {
            id: OccupancyRecordId::new(),
            user_id: user,
            spot_id: spot.id,
            status: OccupancyStatus::CheckedIn,
            checked_in_at: now,
            checked_out_at: None,
            session_duration_secs: None,
            location_accuracy: request.location_accuracy,
        };
        unit.insert_record(&record).await.map_err(|err| match err {
            StoreError::Conflict(_) => LedgerError::AlreadyCheckedIn,
            other => LedgerError::Store(other),
        })?;
        let spot = unit
            .increment_occupancy(spot.id, now)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => LedgerError::SpotFull(spot.id),
                other => LedgerError::Store(other),
            })?;
        unit.set_presence(&UserPresence {
            user_id: user,
            current_spot_id: Some(spot.id),
            checked_in_at: Some(now),
        })
        .await?;
        unit.commit().await?;

        info!(
            user = %user,
            spot = %spot.id,
            occupancy = spot.current_occupancy,
            capacity = spot.total_capacity,
            "User checked in"
        );

        let auto_checkout_at = now
            .checked_add_signed(self.config.auto_checkout_after)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(CheckInOutcome {
            record,
            spot,
            auto_checkout_at,
        })
    }

    /// Close `user`'s open session.
    ///
    /// The spot's occupancy is decremented but never below zero. Fails with
    /// [`LedgerError::NoActiveSession`] without touching any spot.
    pub async fn check_out(&self, user: UserId) -> Result<CheckOutOutcome, LedgerError> {
        self.bounded("check_out", self.check_out_inner(user)).await
    }

    async fn check_out_inner(&self, user: UserId) -> Result<CheckOutOutcome, LedgerError> {
        let mut unit = self.store.begin(user).await?;

        let record = unit
            .active_record()
            .await?
            .ok_or(LedgerError::NoActiveSession)?;

        let now = Utc::now();
        let duration = now
            .signed_duration_since(record.checked_in_at)
            .num_seconds()
            .max(0);

        unit.close_record(record.id, now, duration).await?;
        let spot = unit.decrement_occupancy_clamped(record.spot_id, now).await?;
        unit.set_presence(&UserPresence::absent(user)).await?;
        unit.commit().await?;

        info!(
            user = %user,
            spot = %spot.id,
            occupancy = spot.current_occupancy,
            duration_secs = duration,
            "User checked out"
        );

        Ok(CheckOutOutcome {
            record: OccupancyRecord {
                status: OccupancyStatus::CheckedOut,
                checked_out_at: Some(now),
                session_duration_secs: Some(duration),
                ..record
            },
            spot,
            checked_out_at: now,
            session_duration_secs: duration,
        })
    }

    /// Overwrite a spot's advertised free seats after a geofence check.
    ///
    /// Does not touch occupancy records or the occupancy counter.
    pub async fn update_availability(
        &self,
        user: UserId,
        request: AvailabilityRequest,
    ) -> Result<AvailabilityOutcome, LedgerError> {
        let location = Coordinate::new(request.latitude, request.longitude)?;
        self.bounded(
            "update_availability",
            self.update_availability_inner(user, request, location),
        )
        .await
    }

    async fn update_availability_inner(
        &self,
        user: UserId,
        request: AvailabilityRequest,
        location: Coordinate,
    ) -> Result<AvailabilityOutcome, LedgerError> {
        let mut unit = self.store.begin(user).await?;

        let spot = unit
            .spot(request.spot_id)
            .await?
            .ok_or(LedgerError::SpotNotFound(request.spot_id))?;
        let distance_m = check_geofence(
            location,
            &spot,
            self.config.availability_radius_m,
            GeofenceOperation::AvailabilityUpdate,
        )?;
        if request.seats_available > spot.total_capacity {
            return Err(LedgerError::SeatsExceedCapacity {
                seats: request.seats_available,
                capacity: spot.total_capacity,
            });
        }

        let now = Utc::now();
        let spot = unit
            .set_availability(spot.id, request.seats_available, now)
            .await?;
        let report = AvailabilityReport {
            id: AvailabilityReportId::new(),
            spot_id: spot.id,
            user_id: user,
            seats_available: request.seats_available,
            noise_level: request.noise_level,
            photo_url: request.photo_url,
            user_latitude: location.latitude(),
            user_longitude: location.longitude(),
            distance_m,
            created_at: now,
        };
        unit.record_availability_report(&report).await?;
        unit.commit().await?;

        info!(
            user = %user,
            spot = %spot.id,
            seats_available = request.seats_available,
            distance_m,
            "Availability updated"
        );

        Ok(AvailabilityOutcome {
            availability_status: AvailabilityStatus::classify(
                spot.current_available,
                spot.total_capacity,
            ),
            confidence: confidence_score(spot.last_update_at, now),
            spot,
            report,
        })
    }

    /// Current occupancy and availability of a spot.
    pub async fn spot_status(&self, id: SpotId) -> Result<SpotStatus, LedgerError> {
        let store = Arc::clone(&self.store);
        let spot = self
            .bounded("spot_status", async move {
                store.spot(id).await?.ok_or(LedgerError::SpotNotFound(id))
            })
            .await?;
        Ok(SpotStatus {
            occupancy_percentage: OccupancyLevel::percentage(
                spot.current_occupancy,
                spot.total_capacity,
            ),
            occupancy_level: OccupancyLevel::classify(spot.current_occupancy, spot.total_capacity),
            availability_status: AvailabilityStatus::classify(
                spot.current_available,
                spot.total_capacity,
            ),
            confidence: confidence_score(spot.last_update_at, Utc::now()),
            spot,
        })
    }

    /// Run `operation` under the transaction deadline. Expiry drops the
    /// future, and with it any open unit of work.
    async fn bounded<T>(
        &self,
        name: &'static str,
        operation: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let limit = self.config.transaction_timeout;
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(operation = name, ?limit, "Ledger operation timed out");
                Err(LedgerError::Timeout(limit))
            }
        }
    }
}
