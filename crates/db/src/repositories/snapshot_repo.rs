//! Repository for the `letter_jobs` table.
//!
//! Free-text content is encrypted field by field before any write and
//! decrypted (with per-field degrade) after every read. The editable
//! payload and the research sub-state are written by two separate
//! statements touching disjoint columns, so autosaves and research
//! status merges interleave safely.

use sqlx::PgPool;

use epistle_core::crypto::FieldCipher;
use epistle_core::intake::IntakeForm;
use epistle_core::phase::Phase;
use epistle_core::research::ResearchState;
use epistle_core::snapshot::{JobSnapshot, SnapshotPayload};
use epistle_core::types::UserId;

use crate::models::JobRow;
use crate::DbError;

/// Column list for `letter_jobs` queries.
const COLUMNS: &str = "\
    user_id, job_id, phase_id, step_index, follow_up_index, \
    form, follow_up_questions, follow_up_answers, notes, response_id, \
    research, created_at, updated_at";

/// CRUD for the single active job snapshot per user.
pub struct SnapshotRepo;

impl SnapshotRepo {
    /// Fetch and decrypt the user's snapshot, if any.
    pub async fn get(
        pool: &PgPool,
        cipher: &FieldCipher,
        user_id: UserId,
    ) -> Result<Option<JobSnapshot>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM letter_jobs WHERE user_id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|r| r.into_snapshot(cipher)))
    }

    /// Create or update the user's snapshot from the editable payload.
    ///
    /// Mints a `job_id` for the first persist; an existing row keeps
    /// its `job_id` and `created_at`, and `updated_at` is bumped. The
    /// `research` column is never written here.
    pub async fn upsert(
        pool: &PgPool,
        cipher: &FieldCipher,
        user_id: UserId,
        payload: &SnapshotPayload,
    ) -> Result<JobSnapshot, DbError> {
        let form = encrypt_form(cipher, &payload.form)?;
        let questions = encrypt_list(cipher, &payload.follow_up_questions)?;
        let answers = encrypt_list(cipher, &payload.follow_up_answers)?;
        let notes = payload
            .notes
            .as_deref()
            .map(|n| cipher.encrypt(n))
            .transpose()?;

        let query = format!(
            "INSERT INTO letter_jobs \
                 (user_id, job_id, phase_id, step_index, follow_up_index, \
                  form, follow_up_questions, follow_up_answers, notes, response_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 phase_id = EXCLUDED.phase_id, \
                 step_index = EXCLUDED.step_index, \
                 follow_up_index = EXCLUDED.follow_up_index, \
                 form = EXCLUDED.form, \
                 follow_up_questions = EXCLUDED.follow_up_questions, \
                 follow_up_answers = EXCLUDED.follow_up_answers, \
                 notes = EXCLUDED.notes, \
                 response_id = EXCLUDED.response_id, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(user_id)
            .bind(uuid::Uuid::new_v4())
            .bind(payload.phase.id())
            .bind(payload.step_index)
            .bind(payload.follow_up_index)
            .bind(&form)
            .bind(&questions)
            .bind(&answers)
            .bind(notes)
            .bind(&payload.response_id)
            .fetch_one(pool)
            .await?;

        Ok(row.into_snapshot(cipher))
    }

    /// Replace the research sub-state (and phase) in one write.
    ///
    /// Returns `None` when the user has no snapshot row.
    pub async fn update_research(
        pool: &PgPool,
        cipher: &FieldCipher,
        user_id: UserId,
        phase: Phase,
        research: Option<&ResearchState>,
    ) -> Result<Option<JobSnapshot>, DbError> {
        let document = research
            .map(|state| encrypt_research(cipher, state))
            .transpose()?;

        let query = format!(
            "UPDATE letter_jobs \
             SET phase_id = $2, research = $3, updated_at = NOW() \
             WHERE user_id = $1 \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(user_id)
            .bind(phase.id())
            .bind(document)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|r| r.into_snapshot(cipher)))
    }

    /// Delete the user's snapshot (explicit discard / start-over).
    pub async fn delete(pool: &PgPool, user_id: UserId) -> Result<(), DbError> {
        sqlx::query("DELETE FROM letter_jobs WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ---- encryption helpers ----

fn encrypt_form(cipher: &FieldCipher, form: &IntakeForm) -> Result<serde_json::Value, DbError> {
    Ok(serde_json::json!({
        "issue": cipher.encrypt(&form.issue)?,
        "affected_parties": cipher.encrypt(&form.affected_parties)?,
        "background": cipher.encrypt(&form.background)?,
        "desired_outcome": cipher.encrypt(&form.desired_outcome)?,
    }))
}

fn encrypt_list(cipher: &FieldCipher, items: &[String]) -> Result<serde_json::Value, DbError> {
    let encrypted: Result<Vec<String>, _> = items.iter().map(|item| cipher.encrypt(item)).collect();
    Ok(serde_json::Value::from(encrypted?))
}

/// Serialize the research state with its result field encrypted.
fn encrypt_research(
    cipher: &FieldCipher,
    state: &ResearchState,
) -> Result<serde_json::Value, DbError> {
    let mut stored = state.clone();
    stored.result = state
        .result
        .as_deref()
        .map(|r| cipher.encrypt(r))
        .transpose()?;
    Ok(serde_json::to_value(stored)?)
}
