//! The persisted job snapshot and the client-editable payload.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing::sha256_hex;
use crate::intake::{IntakeForm, INTAKE_STEP_COUNT, MAX_FOLLOW_UP_QUESTIONS};
use crate::phase::Phase;
use crate::research::ResearchState;
use crate::types::{JobId, Timestamp, UserId};

/// Full persisted representation of the single active job for a user.
///
/// `job_id`, `user_id`, `research` and the timestamps are owned by the
/// server; everything else round-trips through [`SnapshotPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub user_id: UserId,
    pub phase: Phase,
    pub step_index: i32,
    pub follow_up_index: i32,
    pub form: IntakeForm,
    pub follow_up_questions: Vec<String>,
    pub follow_up_answers: Vec<String>,
    pub notes: Option<String>,
    pub response_id: Option<String>,
    pub research: Option<ResearchState>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobSnapshot {
    /// A fresh snapshot in the first intake step.
    pub fn new(job_id: JobId, user_id: UserId) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id,
            user_id,
            phase: Phase::Initial,
            step_index: 0,
            follow_up_index: 0,
            form: IntakeForm::default(),
            follow_up_questions: Vec::new(),
            follow_up_answers: Vec::new(),
            notes: None,
            response_id: None,
            research: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when there is nothing worth offering to resume: no intake
    /// content, no follow-ups, no research run.
    pub fn is_empty(&self) -> bool {
        self.form.is_empty() && self.follow_up_questions.is_empty() && self.research.is_none()
    }

    /// The research run, if one exists that blocks a new `start`.
    pub fn active_research(&self) -> Option<&ResearchState> {
        self.research.as_ref().filter(|r| r.blocks_new_run())
    }

    /// The client-editable slice of this snapshot.
    pub fn payload(&self) -> SnapshotPayload {
        SnapshotPayload {
            phase: self.phase,
            step_index: self.step_index,
            follow_up_index: self.follow_up_index,
            form: self.form.clone(),
            follow_up_questions: self.follow_up_questions.clone(),
            follow_up_answers: self.follow_up_answers.clone(),
            notes: self.notes.clone(),
            response_id: self.response_id.clone(),
        }
    }

    /// Overwrite the editable slice from a validated payload.
    pub fn apply_payload(&mut self, payload: &SnapshotPayload) {
        self.phase = payload.phase;
        self.step_index = payload.step_index;
        self.follow_up_index = payload.follow_up_index;
        self.form = payload.form.clone();
        self.follow_up_questions = payload.follow_up_questions.clone();
        self.follow_up_answers = payload.follow_up_answers.clone();
        self.notes = payload.notes.clone();
        self.response_id = payload.response_id.clone();
    }
}

/// The slice of a snapshot the client edits and autosaves.
///
/// The research sub-state is deliberately absent: it is owned by the
/// coordinator and never written by the synchronization engine, so the
/// two write paths cannot clobber each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub phase: Phase,
    pub step_index: i32,
    pub follow_up_index: i32,
    pub form: IntakeForm,
    pub follow_up_questions: Vec<String>,
    pub follow_up_answers: Vec<String>,
    pub notes: Option<String>,
    pub response_id: Option<String>,
}

impl SnapshotPayload {
    /// Structural validation, applied before any persist.
    ///
    /// Rejection leaves the stored snapshot untouched.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.follow_up_answers.len() != self.follow_up_questions.len() {
            return Err(CoreError::Validation(format!(
                "follow_up_answers length {} does not match questions length {}",
                self.follow_up_answers.len(),
                self.follow_up_questions.len()
            )));
        }
        if self.follow_up_questions.len() > MAX_FOLLOW_UP_QUESTIONS {
            return Err(CoreError::Validation(format!(
                "At most {MAX_FOLLOW_UP_QUESTIONS} follow-up questions are allowed"
            )));
        }
        if self.step_index < 0 || self.step_index >= INTAKE_STEP_COUNT {
            return Err(CoreError::Validation(format!(
                "step_index {} out of range",
                self.step_index
            )));
        }
        let max_follow_up = if self.follow_up_questions.is_empty() {
            0
        } else {
            self.follow_up_questions.len() as i32 - 1
        };
        if self.follow_up_index < 0 || self.follow_up_index > max_follow_up {
            return Err(CoreError::Validation(format!(
                "follow_up_index {} out of range",
                self.follow_up_index
            )));
        }
        Ok(())
    }

    /// Deterministic signature over `(job_id, payload)`.
    ///
    /// The synchronization engine skips an autosave when the signature
    /// matches the last successful persist. Serialization is struct
    /// field order, so equal payloads always hash equally.
    pub fn signature(&self, job_id: Option<JobId>) -> String {
        // Tuple serialization cannot fail for these types.
        let serialized = serde_json::to_string(&(job_id, self))
            .unwrap_or_default();
        sha256_hex(serialized.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn payload() -> SnapshotPayload {
        SnapshotPayload {
            phase: Phase::Followup,
            step_index: 3,
            follow_up_index: 1,
            form: IntakeForm {
                issue: "noise".into(),
                affected_parties: "street".into(),
                background: "months".into(),
                desired_outcome: "quiet".into(),
            },
            follow_up_questions: vec!["q1".into(), "q2".into()],
            follow_up_answers: vec!["a1".into(), String::new()],
            notes: None,
            response_id: Some("resp".into()),
        }
    }

    #[test]
    fn valid_payload_passes() {
        payload().validate().unwrap();
    }

    #[test]
    fn answer_question_length_mismatch_is_rejected() {
        let mut p = payload();
        p.follow_up_answers.pop();
        assert_matches!(p.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn out_of_range_cursors_are_rejected() {
        let mut p = payload();
        p.step_index = 4;
        assert_matches!(p.validate(), Err(CoreError::Validation(_)));

        let mut p = payload();
        p.follow_up_index = 2;
        assert_matches!(p.validate(), Err(CoreError::Validation(_)));

        let mut p = payload();
        p.follow_up_questions.clear();
        p.follow_up_answers.clear();
        p.follow_up_index = 0;
        p.validate().unwrap();
    }

    #[test]
    fn signature_is_stable_for_equal_payloads() {
        let job_id = Some(uuid::Uuid::new_v4());
        assert_eq!(payload().signature(job_id), payload().signature(job_id));
    }

    #[test]
    fn signature_changes_on_any_edit() {
        let job_id = Some(uuid::Uuid::new_v4());
        let base = payload().signature(job_id);

        let mut p = payload();
        p.form.issue.push('!');
        assert_ne!(p.signature(job_id), base);

        let mut p = payload();
        p.follow_up_answers[1] = "late answer".into();
        assert_ne!(p.signature(job_id), base);

        // A different job with identical content signs differently.
        assert_ne!(payload().signature(Some(uuid::Uuid::new_v4())), base);
        assert_ne!(payload().signature(None), base);
    }

    #[test]
    fn payload_round_trips_through_snapshot() {
        let mut snap = JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        let p = payload();
        snap.apply_payload(&p);
        assert_eq!(snap.payload(), p);
    }

    #[test]
    fn empty_snapshot_detection() {
        let snap = JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        assert!(snap.is_empty());
        let mut edited = snap.clone();
        edited.form.issue = "something".into();
        assert!(!edited.is_empty());
    }
}
