//! Handlers for the `/letters/job` resource.
//!
//! One active job per user: the job is addressed by the caller's
//! identity, never by id. All endpoints require [`AuthUser`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use epistle_core::error::CoreError;
use epistle_core::phase::{self, GenerationOrigin, Phase};
use epistle_core::snapshot::SnapshotPayload;
use epistle_core::store::SnapshotStore;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/letters/job
///
/// Fetch the caller's job snapshot. 404 when none exists.
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .store
        .get(auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Job" }))?;

    Ok(Json(DataResponse { data: snapshot }))
}

/// PUT /api/v1/letters/job
///
/// Create-or-update the editable slice of the caller's job. Validates
/// before persisting; a rejected payload leaves the stored snapshot
/// untouched. Never writes the research sub-state.
pub async fn save_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SnapshotPayload>,
) -> AppResult<impl IntoResponse> {
    payload.validate()?;

    let snapshot = state.store.upsert(auth.user_id, &payload).await?;

    tracing::debug!(
        job_id = %snapshot.job_id,
        user_id = %auth.user_id,
        phase = ?snapshot.phase,
        "Job snapshot saved"
    );

    Ok(Json(DataResponse { data: snapshot }))
}

/// DELETE /api/v1/letters/job
///
/// Discard the caller's stored job entirely. Returns 204; idempotent.
pub async fn discard_job(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    state.store.delete(auth.user_id).await?;

    tracing::info!(user_id = %auth.user_id, "Job snapshot discarded");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/letters/job/followups
///
/// Run follow-up question generation against the completed intake.
///
/// Accepted from `generating` (the client already advanced past the
/// last intake step) or from `summary` (a regeneration). On generator
/// failure the job returns to where the attempt was triggered from,
/// with prior answers preserved.
pub async fn generate_follow_ups(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let mut snapshot = state
        .store
        .get(auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Job" }))?;

    let origin = match snapshot.phase {
        Phase::Generating => GenerationOrigin::Intake,
        Phase::Summary => {
            phase::begin_regeneration(&mut snapshot)?;
            GenerationOrigin::Summary
        }
        other => {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "Cannot generate follow-ups in phase {other:?}"
            ))));
        }
    };

    match state.followups.generate(&snapshot.form).await {
        Ok(bundle) => {
            phase::apply_follow_ups(&mut snapshot, bundle)?;
            let saved = state.store.upsert(auth.user_id, &snapshot.payload()).await?;

            tracing::info!(
                job_id = %saved.job_id,
                questions = saved.follow_up_questions.len(),
                "Follow-up questions generated"
            );

            Ok(Json(DataResponse { data: saved }))
        }
        Err(e) => {
            tracing::error!(
                job_id = %snapshot.job_id,
                error = %e,
                "Follow-up generation failed"
            );
            phase::generation_failed(&mut snapshot, origin)?;
            state.store.upsert(auth.user_id, &snapshot.payload()).await?;

            Err(AppError::InternalError(format!(
                "Follow-up generation failed: {e}"
            )))
        }
    }
}
