//! Row model for the `letter_jobs` table.
//!
//! Free-text columns hold per-field encryption envelopes; the
//! conversion to a domain [`JobSnapshot`] decrypts field by field,
//! degrading each field independently on failure so one corrupted
//! column never poisons the whole record.

use sqlx::FromRow;

use epistle_core::crypto::FieldCipher;
use epistle_core::intake::IntakeForm;
use epistle_core::phase::Phase;
use epistle_core::research::ResearchState;
use epistle_core::snapshot::JobSnapshot;
use epistle_core::types::{JobId, Timestamp, UserId};

/// A row from the `letter_jobs` table, fields still encrypted.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub user_id: UserId,
    pub job_id: JobId,
    pub phase_id: i16,
    pub step_index: i32,
    pub follow_up_index: i32,
    pub form: serde_json::Value,
    pub follow_up_questions: serde_json::Value,
    pub follow_up_answers: serde_json::Value,
    pub notes: Option<String>,
    pub response_id: Option<String>,
    pub research: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRow {
    /// Decrypt into a domain snapshot, degrading per field.
    pub fn into_snapshot(self, cipher: &FieldCipher) -> JobSnapshot {
        let phase = Phase::from_id(self.phase_id).unwrap_or_else(|| {
            tracing::warn!(phase_id = self.phase_id, "Unknown phase id, degrading to initial");
            Phase::Initial
        });

        JobSnapshot {
            job_id: self.job_id,
            user_id: self.user_id,
            phase,
            step_index: self.step_index,
            follow_up_index: self.follow_up_index,
            form: decrypt_form(cipher, &self.form),
            follow_up_questions: decrypt_list(cipher, "follow_up_questions", &self.follow_up_questions),
            follow_up_answers: decrypt_list(cipher, "follow_up_answers", &self.follow_up_answers),
            notes: self
                .notes
                .map(|envelope| cipher.decrypt_or_default("notes", &envelope)),
            response_id: self.response_id,
            research: self.research.and_then(|value| decrypt_research(cipher, value)),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn field_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Decrypt the four form fields, each degrading to empty on failure.
fn decrypt_form(cipher: &FieldCipher, value: &serde_json::Value) -> IntakeForm {
    let decrypt = |field: &'static str| {
        field_str(value, field)
            .map(|envelope| cipher.decrypt_or_default(field, envelope))
            .unwrap_or_default()
    };
    IntakeForm {
        issue: decrypt("issue"),
        affected_parties: decrypt("affected_parties"),
        background: decrypt("background"),
        desired_outcome: decrypt("desired_outcome"),
    }
}

/// Decrypt an encrypted string list; a malformed column degrades to an
/// empty list, a single bad entry degrades to an empty string.
fn decrypt_list(cipher: &FieldCipher, field: &'static str, value: &serde_json::Value) -> Vec<String> {
    match value.as_array() {
        Some(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|envelope| cipher.decrypt_or_default(field, envelope))
                    .unwrap_or_default()
            })
            .collect(),
        None => {
            tracing::warn!(field, "Expected JSON array, degrading to empty list");
            Vec::new()
        }
    }
}

/// Parse and decrypt the embedded research state.
///
/// An unparseable document degrades to `None`; an unreadable result
/// envelope degrades to an empty result string.
fn decrypt_research(cipher: &FieldCipher, value: serde_json::Value) -> Option<ResearchState> {
    match serde_json::from_value::<ResearchState>(value) {
        Ok(mut state) => {
            state.result = state
                .result
                .map(|envelope| cipher.decrypt_or_default("research.result", &envelope));
            Some(state)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed research document, degrading to none");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher() -> FieldCipher {
        FieldCipher::from_hex_key(KEY).unwrap()
    }

    fn row(cipher: &FieldCipher) -> JobRow {
        let enc = |s: &str| serde_json::Value::String(cipher.encrypt(s).unwrap());
        JobRow {
            user_id: uuid::Uuid::new_v4(),
            job_id: uuid::Uuid::new_v4(),
            phase_id: Phase::Followup.id(),
            step_index: 3,
            follow_up_index: 0,
            form: serde_json::json!({
                "issue": enc("mould in the stairwell"),
                "affected_parties": enc("all tenants"),
                "background": enc("reported twice"),
                "desired_outcome": enc("remediation"),
            }),
            follow_up_questions: serde_json::json!([enc("since when?")]),
            follow_up_answers: serde_json::json!([enc("last winter")]),
            notes: None,
            response_id: Some("resp-1".into()),
            research: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn round_trips_encrypted_fields() {
        let cipher = cipher();
        let snapshot = row(&cipher).into_snapshot(&cipher);
        assert_eq!(snapshot.phase, Phase::Followup);
        assert_eq!(snapshot.form.issue, "mould in the stairwell");
        assert_eq!(snapshot.follow_up_questions, vec!["since when?"]);
        assert_eq!(snapshot.follow_up_answers, vec!["last winter"]);
    }

    #[test]
    fn corrupted_field_degrades_alone() {
        let cipher = cipher();
        let mut row = row(&cipher);
        row.form["issue"] = serde_json::Value::String("enc:v1:zz:zz".into());

        let snapshot = row.into_snapshot(&cipher);
        // Only the corrupted field is lost.
        assert_eq!(snapshot.form.issue, "");
        assert_eq!(snapshot.form.affected_parties, "all tenants");
        assert_eq!(snapshot.follow_up_questions, vec!["since when?"]);
    }

    #[test]
    fn unknown_phase_id_degrades_to_initial() {
        let cipher = cipher();
        let mut row = row(&cipher);
        row.phase_id = 99;
        assert_eq!(row.into_snapshot(&cipher).phase, Phase::Initial);
    }

    #[test]
    fn malformed_research_document_degrades_to_none() {
        let cipher = cipher();
        let mut row = row(&cipher);
        row.research = Some(serde_json::json!({"status": 42}));
        assert_eq!(row.into_snapshot(&cipher).research, None);
    }

    #[test]
    fn malformed_list_column_degrades_to_empty() {
        let cipher = cipher();
        let mut row = row(&cipher);
        row.follow_up_questions = serde_json::json!("not-an-array");
        let snapshot = row.into_snapshot(&cipher);
        assert!(snapshot.follow_up_questions.is_empty());
        // Siblings are untouched.
        assert_eq!(snapshot.follow_up_answers, vec!["last winter"]);
    }
}
