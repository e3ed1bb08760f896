//! Coarse job phase and its pure transition rules.
//!
//! Every transition is a synchronous function over a snapshot: no I/O,
//! no clock beyond what the caller passes in. Callers persist the
//! snapshot after a successful transition; a failed transition leaves
//! it untouched.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::intake::{FollowUpBundle, INTAKE_STEP_COUNT};
use crate::snapshot::JobSnapshot;

/// The coarse stage of a letter job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initial,
    Generating,
    Followup,
    Summary,
    Research,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Initial
    }
}

impl Phase {
    /// Database status id (SMALLINT, 1-based).
    pub fn id(self) -> i16 {
        match self {
            Self::Initial => 1,
            Self::Generating => 2,
            Self::Followup => 3,
            Self::Summary => 4,
            Self::Research => 5,
        }
    }

    /// Inverse of [`Phase::id`].
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Self::Initial),
            2 => Some(Self::Generating),
            3 => Some(Self::Followup),
            4 => Some(Self::Summary),
            5 => Some(Self::Research),
            _ => None,
        }
    }
}

/// Where a follow-up generation attempt was triggered from, so a
/// failure can return the user to the right place with prior state
/// preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOrigin {
    /// The last intake step; failure returns to `initial` at that step.
    Intake,
    /// A "regenerate" action from the summary; failure returns there.
    Summary,
}

fn require_phase(snapshot: &JobSnapshot, expected: Phase, op: &str) -> Result<(), CoreError> {
    if snapshot.phase != expected {
        return Err(CoreError::Conflict(format!(
            "Cannot {op} in phase {:?}",
            snapshot.phase
        )));
    }
    Ok(())
}

/// Advance the intake by one step; on the last step (with a complete
/// form) the job moves to `generating`.
pub fn advance_intake(snapshot: &mut JobSnapshot) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Initial, "advance intake")?;
    if snapshot.step_index < INTAKE_STEP_COUNT - 1 {
        snapshot.step_index += 1;
        return Ok(());
    }
    if !snapshot.form.is_complete() {
        return Err(CoreError::Validation(
            "All intake fields must be filled before generating follow-ups".into(),
        ));
    }
    snapshot.phase = Phase::Generating;
    Ok(())
}

/// Step back one intake step. A no-op at the first step.
pub fn retreat_intake(snapshot: &mut JobSnapshot) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Initial, "step back")?;
    if snapshot.step_index > 0 {
        snapshot.step_index -= 1;
    }
    Ok(())
}

/// Re-run follow-up generation from the summary.
pub fn begin_regeneration(snapshot: &mut JobSnapshot) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Summary, "regenerate follow-ups")?;
    snapshot.phase = Phase::Generating;
    Ok(())
}

/// Apply the generator's output.
///
/// Zero questions skip the follow-up phase entirely: an empty answer
/// bundle is auto-submitted and the job lands on `summary`. Otherwise
/// answers are pre-filled empty (keeping the parallel-length
/// invariant) and the cursor starts at the first question.
pub fn apply_follow_ups(
    snapshot: &mut JobSnapshot,
    bundle: FollowUpBundle,
) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Generating, "apply follow-ups")?;
    let bundle = bundle.normalized();

    snapshot.notes = bundle.notes;
    snapshot.response_id = bundle.response_id;

    if bundle.questions.is_empty() {
        snapshot.follow_up_questions = Vec::new();
        snapshot.follow_up_answers = Vec::new();
        snapshot.follow_up_index = 0;
        snapshot.phase = Phase::Summary;
    } else {
        snapshot.follow_up_answers = vec![String::new(); bundle.questions.len()];
        snapshot.follow_up_questions = bundle.questions;
        snapshot.follow_up_index = 0;
        snapshot.phase = Phase::Followup;
    }
    Ok(())
}

/// A generation attempt failed; return to where it was triggered from,
/// preserving all prior state.
pub fn generation_failed(
    snapshot: &mut JobSnapshot,
    origin: GenerationOrigin,
) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Generating, "record generation failure")?;
    match origin {
        GenerationOrigin::Intake => {
            snapshot.phase = Phase::Initial;
            snapshot.step_index = INTAKE_STEP_COUNT - 1;
        }
        GenerationOrigin::Summary => {
            snapshot.phase = Phase::Summary;
        }
    }
    Ok(())
}

/// Record the answer to a follow-up question by index.
pub fn answer_follow_up(
    snapshot: &mut JobSnapshot,
    index: i32,
    answer: String,
) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Followup, "answer follow-up")?;
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| snapshot.follow_up_answers.get_mut(i))
        .ok_or_else(|| CoreError::Validation(format!("No follow-up question at index {index}")))?;
    *slot = answer;
    Ok(())
}

/// Move to the next follow-up question; from the last question the
/// full bundle is submitted and the job lands on `summary`.
pub fn advance_follow_up(snapshot: &mut JobSnapshot) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Followup, "advance follow-up")?;
    let last = snapshot.follow_up_questions.len() as i32 - 1;
    if snapshot.follow_up_index < last {
        snapshot.follow_up_index += 1;
    } else {
        snapshot.phase = Phase::Summary;
    }
    Ok(())
}

/// Jump from the summary back to a specific follow-up question to edit
/// its answer.
pub fn edit_follow_up(snapshot: &mut JobSnapshot, index: i32) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Summary, "edit follow-up")?;
    if index < 0 || index as usize >= snapshot.follow_up_questions.len() {
        return Err(CoreError::Validation(format!(
            "No follow-up question at index {index}"
        )));
    }
    snapshot.phase = Phase::Followup;
    snapshot.follow_up_index = index;
    Ok(())
}

/// Jump from the summary back to the intake, discarding follow-ups.
///
/// Destructive (existing follow-up answers are invalidated); the
/// client confirms with the user before calling this.
pub fn return_to_intake(snapshot: &mut JobSnapshot) -> Result<(), CoreError> {
    require_phase(snapshot, Phase::Summary, "return to intake")?;
    snapshot.phase = Phase::Initial;
    snapshot.step_index = 0;
    snapshot.follow_up_questions = Vec::new();
    snapshot.follow_up_answers = Vec::new();
    snapshot.follow_up_index = 0;
    snapshot.notes = None;
    snapshot.response_id = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeForm;
    use crate::snapshot::JobSnapshot;
    use assert_matches::assert_matches;

    fn snapshot_at(phase: Phase) -> JobSnapshot {
        let mut snap = JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        snap.phase = phase;
        snap.form = IntakeForm {
            issue: "a".into(),
            affected_parties: "b".into(),
            background: "c".into(),
            desired_outcome: "d".into(),
        };
        snap
    }

    fn bundle(questions: &[&str]) -> FollowUpBundle {
        FollowUpBundle {
            questions: questions.iter().map(|q| q.to_string()).collect(),
            notes: Some("context".into()),
            response_id: Some("resp-1".into()),
        }
    }

    #[test]
    fn intake_walks_steps_then_generates() {
        let mut snap = snapshot_at(Phase::Initial);
        for expected in 1..INTAKE_STEP_COUNT {
            advance_intake(&mut snap).unwrap();
            assert_eq!(snap.step_index, expected);
        }
        advance_intake(&mut snap).unwrap();
        assert_eq!(snap.phase, Phase::Generating);
    }

    #[test]
    fn last_step_requires_complete_form() {
        let mut snap = snapshot_at(Phase::Initial);
        snap.step_index = INTAKE_STEP_COUNT - 1;
        snap.form.desired_outcome = String::new();
        assert_matches!(advance_intake(&mut snap), Err(CoreError::Validation(_)));
        assert_eq!(snap.phase, Phase::Initial);
    }

    #[test]
    fn zero_questions_skip_followup_phase() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&[])).unwrap();
        assert_eq!(snap.phase, Phase::Summary);
        assert!(snap.follow_up_questions.is_empty());
        assert!(snap.follow_up_answers.is_empty());
        assert_eq!(snap.notes.as_deref(), Some("context"));
    }

    #[test]
    fn questions_prefill_parallel_empty_answers() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&["q1", "q2"])).unwrap();
        assert_eq!(snap.phase, Phase::Followup);
        assert_eq!(snap.follow_up_answers.len(), snap.follow_up_questions.len());
        assert_eq!(snap.follow_up_index, 0);
    }

    #[test]
    fn answering_walks_to_summary() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&["q1", "q2"])).unwrap();

        answer_follow_up(&mut snap, 0, "first".into()).unwrap();
        advance_follow_up(&mut snap).unwrap();
        assert_eq!(snap.follow_up_index, 1);

        answer_follow_up(&mut snap, 1, "second".into()).unwrap();
        advance_follow_up(&mut snap).unwrap();
        assert_eq!(snap.phase, Phase::Summary);
        assert_eq!(snap.follow_up_answers, vec!["first", "second"]);
        assert_eq!(snap.follow_up_answers.len(), snap.follow_up_questions.len());
    }

    #[test]
    fn answer_out_of_bounds_is_rejected() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&["q1"])).unwrap();
        assert_matches!(
            answer_follow_up(&mut snap, 3, "x".into()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn generation_failure_returns_to_intake_last_step() {
        let mut snap = snapshot_at(Phase::Generating);
        generation_failed(&mut snap, GenerationOrigin::Intake).unwrap();
        assert_eq!(snap.phase, Phase::Initial);
        assert_eq!(snap.step_index, INTAKE_STEP_COUNT - 1);
        assert_eq!(snap.form.issue, "a"); // prior state preserved
    }

    #[test]
    fn generation_failure_from_regenerate_returns_to_summary() {
        let mut snap = snapshot_at(Phase::Summary);
        apply_follow_ups(&mut snap, bundle(&["old q"])).unwrap_err(); // wrong phase
        begin_regeneration(&mut snap).unwrap();
        generation_failed(&mut snap, GenerationOrigin::Summary).unwrap();
        assert_eq!(snap.phase, Phase::Summary);
    }

    #[test]
    fn edit_follow_up_jumps_back_at_index() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&["q1", "q2"])).unwrap();
        snap.phase = Phase::Summary;

        edit_follow_up(&mut snap, 1).unwrap();
        assert_eq!(snap.phase, Phase::Followup);
        assert_eq!(snap.follow_up_index, 1);

        assert_matches!(
            edit_follow_up(&mut snap, 0),
            Err(CoreError::Conflict(_)) // already back in followup
        );
    }

    #[test]
    fn return_to_intake_discards_followups() {
        let mut snap = snapshot_at(Phase::Generating);
        apply_follow_ups(&mut snap, bundle(&["q1"])).unwrap();
        snap.phase = Phase::Summary;

        return_to_intake(&mut snap).unwrap();
        assert_eq!(snap.phase, Phase::Initial);
        assert_eq!(snap.step_index, 0);
        assert!(snap.follow_up_questions.is_empty());
        assert!(snap.notes.is_none());
        assert_eq!(snap.form.issue, "a"); // intake answers survive
    }

    #[test]
    fn phase_ids_round_trip() {
        for phase in [
            Phase::Initial,
            Phase::Generating,
            Phase::Followup,
            Phase::Summary,
            Phase::Research,
        ] {
            assert_eq!(Phase::from_id(phase.id()), Some(phase));
        }
        assert_eq!(Phase::from_id(0), None);
        assert_eq!(Phase::from_id(6), None);
    }
}
