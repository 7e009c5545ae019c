//! Error types for the Havn HTTP surface.
//!
//! [`ApiError`] unifies ledger outcomes and request-level failures into one
//! enum whose [`IntoResponse`] impl renders the protocol error envelope:
//!
//! ```json
//! { "success": false, "error": { "code": "SPOT_NOT_FOUND", "message": "...", "details": {} } }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use havn_occupancy::{GeofenceOperation, LedgerError, ValidationError};
use serde_json::{Value, json};

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The request body or path could not be accepted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The caller could not be identified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            Self::Ledger(err) => classify_ledger_error(err),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            String::from("An internal error occurred")
        } else {
            self.to_string()
        };

        let mut error = json!({ "code": code, "message": message });
        if let (Some(details), Some(obj)) = (details, error.as_object_mut()) {
            obj.insert(String::from("details"), details);
        }

        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}

/// Map a ledger outcome to status, protocol code, and optional details.
fn classify_ledger_error(err: &LedgerError) -> (StatusCode, &'static str, Option<Value>) {
    match err {
        LedgerError::AlreadyCheckedIn => (StatusCode::BAD_REQUEST, "ALREADY_CHECKED_IN", None),
        LedgerError::SpotNotFound(_) => (StatusCode::NOT_FOUND, "SPOT_NOT_FOUND", None),
        LedgerError::NoActiveSession => (StatusCode::NOT_FOUND, "NO_ACTIVE_CHECKIN", None),
        LedgerError::GeofenceViolation {
            distance_m,
            radius_m,
            operation,
        } => {
            let status = match operation {
                GeofenceOperation::CheckIn => StatusCode::BAD_REQUEST,
                GeofenceOperation::AvailabilityUpdate => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let details = json!({ "distance": distance_m, "radius": radius_m });
            (status, "GEOFENCE_VIOLATION", Some(details))
        }
        LedgerError::SpotFull(_) => (StatusCode::CONFLICT, "SPOT_FULL", None),
        LedgerError::SeatsExceedCapacity { .. } => {
            (StatusCode::BAD_REQUEST, "SEATS_EXCEED_CAPACITY", None)
        }
        LedgerError::Validation(ValidationError::InvalidLatitude(_)) => {
            (StatusCode::BAD_REQUEST, "INVALID_LATITUDE", None)
        }
        LedgerError::Validation(ValidationError::InvalidLongitude(_)) => {
            (StatusCode::BAD_REQUEST, "INVALID_LONGITUDE", None)
        }
        LedgerError::Validation(ValidationError::InvalidAccuracy(_)) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None)
        }
        LedgerError::Timeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "TIMEOUT", None),
        LedgerError::Store(store) => {
            tracing::error!(error = %store, "Occupancy store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use havn_occupancy::StoreError;
    use havn_types::SpotId;

    use super::*;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn geofence_status_depends_on_operation() {
        let check_in = LedgerError::GeofenceViolation {
            distance_m: 250.0,
            radius_m: 200.0,
            operation: GeofenceOperation::CheckIn,
        };
        let (status, body) = render(check_in.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "GEOFENCE_VIOLATION");
        assert_eq!(body["error"]["details"]["distance"], 250.0);

        let availability = LedgerError::GeofenceViolation {
            distance_m: 120.0,
            radius_m: 100.0,
            operation: GeofenceOperation::AvailabilityUpdate,
        };
        let (status, _) = render(availability.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn store_errors_hide_their_message() {
        let err = LedgerError::Store(StoreError::Unavailable(String::from("pool exhausted")));
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn ledger_codes() {
        let cases = [
            (LedgerError::AlreadyCheckedIn, StatusCode::BAD_REQUEST, "ALREADY_CHECKED_IN"),
            (
                LedgerError::SpotNotFound(SpotId::new()),
                StatusCode::NOT_FOUND,
                "SPOT_NOT_FOUND",
            ),
            (LedgerError::NoActiveSession, StatusCode::NOT_FOUND, "NO_ACTIVE_CHECKIN"),
            (LedgerError::SpotFull(SpotId::new()), StatusCode::CONFLICT, "SPOT_FULL"),
            (
                ValidationError::InvalidLatitude(91.0).into(),
                StatusCode::BAD_REQUEST,
                "INVALID_LATITUDE",
            ),
            (
                ValidationError::InvalidLongitude(181.0).into(),
                StatusCode::BAD_REQUEST,
                "INVALID_LONGITUDE",
            ),
            (
                LedgerError::Timeout(std::time::Duration::from_secs(5)),
                StatusCode::SERVICE_UNAVAILABLE,
                "TIMEOUT",
            ),
        ];
        for (err, expected_status, expected_code) in cases {
            let (status, body) = render(err.into()).await;
            assert_eq!(status, expected_status);
            assert_eq!(body["error"]["code"], expected_code);
        }
    }

    #[tokio::test]
    async fn unauthorized_is_401() {
        let (status, body) = render(ApiError::Unauthorized(String::from("missing"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}
