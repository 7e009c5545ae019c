//! Caller identity extractor.
//!
//! Authentication itself happens upstream (API gateway or identity
//! provider middleware). The authenticated user id reaches this service in
//! the [`USER_ID_HEADER`] header; handlers that act on behalf of a user take
//! a [`CallerId`] parameter.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use havn_types::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user making the request.
///
/// ```ignore
/// async fn my_handler(CallerId(user): CallerId) -> ApiResult<Json<()>> {
///     tracing::info!(%user, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub UserId);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized(String::from("Missing user identity")))?;

        let user = raw
            .trim()
            .parse::<UserId>()
            .map_err(|_invalid| ApiError::Unauthorized(String::from("Invalid user identity")))?;

        Ok(Self(user))
    }
}
