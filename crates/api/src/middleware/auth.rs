//! User identity extractor for Axum handlers.
//!
//! Identity arrives from the fronting gateway as an `x-user-id`
//! header carrying the user's UUID. The gateway terminates the actual
//! session auth; this extractor only validates the header shape.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use epistle_core::error::CoreError;
use epistle_core::types::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from the `x-user-id` header.
///
/// Use this as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing x-user-id header".into()))
            })?;

        let user_id = header.parse::<UserId>().map_err(|_| {
            AppError::Core(CoreError::Unauthorized(
                "x-user-id must be a valid UUID".into(),
            ))
        })?;

        Ok(AuthUser { user_id })
    }
}
