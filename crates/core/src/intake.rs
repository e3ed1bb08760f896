//! Intake form and follow-up question types.

use serde::{Deserialize, Serialize};

/// Number of intake steps (one free-text field per step).
pub const INTAKE_STEP_COUNT: i32 = 4;

/// Upper bound on server-generated follow-up questions.
pub const MAX_FOLLOW_UP_QUESTIONS: usize = 5;

/// The four free-text intake answers, collected one step at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeForm {
    pub issue: String,
    pub affected_parties: String,
    pub background: String,
    pub desired_outcome: String,
}

impl IntakeForm {
    /// The field edited at the given intake step, if the step is valid.
    pub fn field(&self, step: i32) -> Option<&str> {
        match step {
            0 => Some(&self.issue),
            1 => Some(&self.affected_parties),
            2 => Some(&self.background),
            3 => Some(&self.desired_outcome),
            _ => None,
        }
    }

    /// True when every field has non-whitespace content.
    pub fn is_complete(&self) -> bool {
        !self.issue.trim().is_empty()
            && !self.affected_parties.trim().is_empty()
            && !self.background.trim().is_empty()
            && !self.desired_outcome.trim().is_empty()
    }

    /// True when nothing has been entered yet.
    pub fn is_empty(&self) -> bool {
        self.issue.trim().is_empty()
            && self.affected_parties.trim().is_empty()
            && self.background.trim().is_empty()
            && self.desired_outcome.trim().is_empty()
    }
}

/// What the follow-up-question collaborator returns for an intake form.
///
/// `notes` and `response_id` are opaque context the generator wants
/// carried through to later composition calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUpBundle {
    pub questions: Vec<String>,
    pub notes: Option<String>,
    pub response_id: Option<String>,
}

impl FollowUpBundle {
    /// Drop empty questions and cap at [`MAX_FOLLOW_UP_QUESTIONS`].
    pub fn normalized(mut self) -> Self {
        self.questions.retain(|q| !q.trim().is_empty());
        self.questions.truncate(MAX_FOLLOW_UP_QUESTIONS);
        self
    }
}
