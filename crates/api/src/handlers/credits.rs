//! Handler for the `/credits` resource.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use epistle_core::store::CreditLedger;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/credits
///
/// Current credit balance for the caller. Users without an account
/// row report a zero balance.
pub async fn get_balance(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let balance = state.ledger.balance(auth.user_id).await?;
    Ok(Json(DataResponse { data: balance }))
}
