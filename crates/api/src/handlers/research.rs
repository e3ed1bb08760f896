//! Handlers for the `/letters/job/research` endpoints.
//!
//! Thin HTTP shims over the coordinator: it owns locking, billing,
//! and merge semantics; these handlers only translate errors into the
//! response envelope.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/letters/job/research/start
///
/// Start a research run. Debits the configured cost exactly once;
/// a duplicate start while a run is active returns 409 with the
/// authoritative snapshot in `data`.
pub async fn start_research(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let receipt = state.coordinator.start(auth.user_id).await?;

    tracing::info!(
        job_id = %receipt.job.job_id,
        user_id = %auth.user_id,
        remaining_credits = receipt.remaining_credits,
        "Research run started"
    );

    Ok(Json(DataResponse { data: receipt.job }))
}

/// GET /api/v1/letters/job/research/status
///
/// Fetch the runner's latest report, merge it server-side, and return
/// the canonical snapshot. A no-op for jobs without an active run.
pub async fn research_status(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.coordinator.status(auth.user_id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/v1/letters/job/research/cancel
///
/// Request cancellation of the active run. The run moves to
/// `cancelling`; the terminal status arrives through later polls.
pub async fn cancel_research(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.coordinator.cancel(auth.user_id).await?;

    tracing::info!(
        job_id = %snapshot.job_id,
        user_id = %auth.user_id,
        "Research cancellation requested"
    );

    Ok(Json(DataResponse { data: snapshot }))
}
