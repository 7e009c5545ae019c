//! REST endpoint handlers for the Havn API.
//!
//! Every successful response is wrapped as `{"success": true, "data": ...}`;
//! failures go through [`ApiError`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness and hub status |
//! | `POST` | `/api/v1/occupancy/checkin` | Open a session at a spot |
//! | `POST` | `/api/v1/occupancy/checkout` | Close the caller's session |
//! | `GET` | `/api/v1/spots/{id}` | Occupancy and availability of one spot |
//! | `POST` | `/api/v1/spots/{id}/update` | Crowd-sourced free-seat report |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use havn_hub::HubHandle;
use havn_occupancy::{AvailabilityRequest, CheckInRequest};
use havn_types::{
    AvailabilityStatus, BroadcastEnvelope, NoiseLevel, OccupancyLevel, OccupancyRecordId, Spot,
    SpotChange, SpotId, SpotSummary, SpotUpdate,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::auth::CallerId;
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidatedJson;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Success envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSuccess<T> {
    /// Always `true`.
    pub success: bool,
    /// The payload.
    pub data: T,
}

const fn ok<T: Serialize>(data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess {
        success: true,
        data,
    })
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/occupancy/checkin`.
///
/// Coordinates are range-checked by the ledger so that out-of-range values
/// report `INVALID_LATITUDE` / `INVALID_LONGITUDE`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckInBody {
    /// Spot to check into.
    pub spot_id: SpotId,
    /// Reported latitude in degrees.
    pub latitude: f64,
    /// Reported longitude in degrees.
    pub longitude: f64,
    /// Reported GPS accuracy in meters.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 10_000.0))]
    pub location_accuracy: f64,
}

/// Body of `POST /api/v1/spots/{id}/update`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AvailabilityBody {
    /// Free seats observed.
    pub seats_available: u32,
    /// Perceived noise.
    #[serde(default)]
    pub noise_level: Option<NoiseLevel>,
    /// Photo of the spot.
    #[serde(default)]
    #[validate(url, length(max = 2048))]
    pub photo_url: Option<String>,
    /// Reporter latitude in degrees.
    pub user_latitude: f64,
    /// Reporter longitude in degrees.
    pub user_longitude: f64,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Payload of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` when the hub answers, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// `single_instance` or `relayed`.
    pub broadcast_mode: &'static str,
    /// Connected observers on this instance, if the hub answered.
    pub observers: Option<usize>,
}

/// Payload of a successful check-in.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInResponse {
    /// The new occupancy record.
    pub occupancy_record_id: OccupancyRecordId,
    /// The spot after the increment.
    pub spot: SpotSummary,
    /// Session start.
    pub checked_in_at: DateTime<Utc>,
    /// Advisory session end.
    pub auto_checkout_at: DateTime<Utc>,
}

/// Payload of a successful check-out.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutResponse {
    /// The spot after the decrement.
    pub spot: SpotSummary,
    /// Session end.
    pub checked_out_at: DateTime<Utc>,
    /// Session length as `HH:MM:SS`.
    pub session_duration: String,
    /// Session length in seconds.
    pub session_duration_secs: i64,
}

/// Payload of `GET /api/v1/spots/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SpotStatusResponse {
    /// Spot identifier.
    pub id: SpotId,
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Total seats.
    pub total_capacity: u32,
    /// Checked-in users.
    pub current_occupancy: u32,
    /// `current_occupancy * 100 / total_capacity`.
    pub occupancy_percentage: u32,
    /// Crowding classification.
    pub occupancy_level: OccupancyLevel,
    /// Latest crowd-sourced free seats.
    pub current_available: Option<u32>,
    /// Free-seat classification.
    pub availability_status: AvailabilityStatus,
    /// Confidence of `current_available`, 0 to 100.
    pub confidence: u8,
    /// When `current_available` was last reported.
    pub last_update_at: Option<DateTime<Utc>>,
}

/// Payload of a successful availability update.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    /// Spot identifier.
    pub spot_id: SpotId,
    /// The stored free-seat figure.
    pub current_available: Option<u32>,
    /// Free-seat classification.
    pub availability_status: AvailabilityStatus,
    /// Confidence of the new figure.
    pub confidence: u8,
    /// When the report was stored.
    pub last_update_at: Option<DateTime<Utc>>,
    /// Reporter distance from the spot in meters.
    pub distance_m: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiSuccess<HealthResponse>> {
    let observers = state.hub.observer_count().await.ok();
    ok(HealthResponse {
        status: if observers.is_some() {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        broadcast_mode: if state.hub.is_relayed() {
            "relayed"
        } else {
            "single_instance"
        },
        observers,
    })
}

/// `POST /api/v1/occupancy/checkin`
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    ValidatedJson(body): ValidatedJson<CheckInBody>,
) -> ApiResult<Json<ApiSuccess<CheckInResponse>>> {
    let request = CheckInRequest {
        spot_id: body.spot_id,
        latitude: body.latitude,
        longitude: body.longitude,
        location_accuracy: body.location_accuracy,
    };
    let outcome = state.ledger.check_in(user, &request).await?;

    announce(&state.hub, &outcome.spot, SpotChange::CheckIn).await;

    Ok(ok(CheckInResponse {
        occupancy_record_id: outcome.record.id,
        spot: outcome.spot.summary(),
        checked_in_at: outcome.record.checked_in_at,
        auto_checkout_at: outcome.auto_checkout_at,
    }))
}

/// `POST /api/v1/occupancy/checkout`
pub async fn check_out(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
) -> ApiResult<Json<ApiSuccess<CheckOutResponse>>> {
    let outcome = state.ledger.check_out(user).await?;

    announce(&state.hub, &outcome.spot, SpotChange::CheckOut).await;

    Ok(ok(CheckOutResponse {
        spot: outcome.spot.summary(),
        checked_out_at: outcome.checked_out_at,
        session_duration: outcome.formatted_duration(),
        session_duration_secs: outcome.session_duration_secs,
    }))
}

/// `GET /api/v1/spots/{id}`
pub async fn get_spot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiSuccess<SpotStatusResponse>>> {
    let id = parse_spot_id(&id)?;
    let status = state.ledger.spot_status(id).await?;
    let spot = status.spot;

    Ok(ok(SpotStatusResponse {
        id: spot.id,
        name: spot.name,
        latitude: spot.latitude,
        longitude: spot.longitude,
        total_capacity: spot.total_capacity,
        current_occupancy: spot.current_occupancy,
        occupancy_percentage: status.occupancy_percentage,
        occupancy_level: status.occupancy_level,
        current_available: spot.current_available,
        availability_status: status.availability_status,
        confidence: status.confidence,
        last_update_at: spot.last_update_at,
    }))
}

/// `POST /api/v1/spots/{id}/update`
pub async fn update_availability(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<AvailabilityBody>,
) -> ApiResult<Json<ApiSuccess<AvailabilityResponse>>> {
    let request = AvailabilityRequest {
        spot_id: parse_spot_id(&id)?,
        seats_available: body.seats_available,
        noise_level: body.noise_level,
        photo_url: body.photo_url,
        latitude: body.user_latitude,
        longitude: body.user_longitude,
    };
    let outcome = state.ledger.update_availability(user, request).await?;

    announce(&state.hub, &outcome.spot, SpotChange::Availability).await;

    Ok(ok(AvailabilityResponse {
        spot_id: outcome.spot.id,
        current_available: outcome.spot.current_available,
        availability_status: outcome.availability_status,
        confidence: outcome.confidence,
        last_update_at: outcome.spot.last_update_at,
        distance_m: outcome.report.distance_m,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_spot_id(raw: &str) -> ApiResult<SpotId> {
    raw.parse()
        .map_err(|e| ApiError::Validation(format!("invalid spot id {raw:?}: {e}")))
}

/// Push the committed spot state to observers. The HTTP outcome does not
/// depend on delivery.
async fn announce(hub: &HubHandle, spot: &Spot, change: SpotChange) {
    let envelope = BroadcastEnvelope::SpotUpdate(SpotUpdate::from_spot(spot, change));
    if let Err(e) = hub.publish(&envelope).await {
        warn!(spot_id = %spot.id, ?change, error = %e, "Failed to publish spot update");
    }
}
