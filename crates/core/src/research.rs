//! Research run sub-state machine.
//!
//! One [`ResearchState`] represents one attempt at the long-running
//! external deep-research task. It is embedded in the job snapshot and
//! mutated in place by the coordinator's merge logic; a re-run after a
//! terminal status replaces the whole value rather than mutating it.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Status of a research run.
///
/// `Idle` is a placeholder for "no run started"; `RequiresAction` is
/// reported by some runners when the run is waiting on external input
/// and may move back to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Idle,
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    RequiresAction,
}

impl Default for ResearchStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl ResearchStatus {
    /// Terminal statuses never transition again; a new run replaces
    /// the state wholesale.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a runner-reported transition from `self` to `next` is
    /// legal. Transitions are monotonic apart from the explicit
    /// cancellation and failure edges; a repeated status is legal (it
    /// carries progress/activity updates).
    pub fn can_transition_to(self, next: Self) -> bool {
        use ResearchStatus::*;
        if self == next {
            return true;
        }
        match self {
            Idle => matches!(next, Queued | Failed),
            Queued => matches!(next, InProgress | Completed | Failed | Cancelling | Cancelled),
            InProgress => matches!(next, RequiresAction | Completed | Failed | Cancelling | Cancelled),
            // A run the user asked to cancel may still finish or fail
            // before the runner acknowledges.
            Cancelling => matches!(next, Cancelled | Completed | Failed),
            RequiresAction => matches!(next, InProgress | Completed | Failed | Cancelling | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

/// One entry in the run's audit trail of research steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub kind: String,
    pub label: String,
    pub status: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Shape of the research state kept in the snapshot.
///
/// `Simple` strips progress and activities at merge time, leaving the
/// result-only shape; the state machine itself is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    Rich,
    Simple,
}

/// A status report fetched from the external research runner.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: ResearchStatus,
    pub progress: Option<f32>,
    pub activities: Vec<Activity>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Result of applying a [`RunUpdate`] to a [`ResearchState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The state changed and must be persisted.
    Applied,
    /// Nothing new; skip the write.
    Unchanged,
    /// Illegal transition (backwards, or from a terminal state);
    /// the state is untouched.
    Rejected,
}

/// State of a single research run, embedded in the job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub status: ResearchStatus,
    pub progress: Option<f32>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Amount actually debited for this run. Set exactly once, at
    /// debit time; survives failure so billing stays auditable.
    pub credits_charged: Option<f64>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub billed_at: Option<Timestamp>,
    /// Monotone merge counter; pollers discard snapshots whose cursor
    /// is behind the last one they applied.
    #[serde(default)]
    pub cursor: u64,
    /// Handle assigned by the external runner once it accepts the run.
    pub runner_job_id: Option<String>,
}

impl ResearchState {
    /// Fresh state for a run that was just debited and queued.
    pub fn queued(credits: f64, now: Timestamp) -> Self {
        Self {
            status: ResearchStatus::Queued,
            progress: None,
            activities: Vec::new(),
            result: None,
            error: None,
            credits_charged: Some(credits),
            started_at: Some(now),
            completed_at: None,
            billed_at: Some(now),
            cursor: 0,
            runner_job_id: None,
        }
    }

    /// True while this run blocks a new `start` (anything that is
    /// neither terminal nor the idle placeholder, `cancelling`
    /// included).
    pub fn blocks_new_run(&self) -> bool {
        !self.status.is_terminal() && self.status != ResearchStatus::Idle
    }

    /// Record the handle the runner assigned at submission.
    pub fn accept(&mut self, runner_job_id: String) {
        self.runner_job_id = Some(runner_job_id);
        self.cursor += 1;
    }

    /// Mark the run failed locally (e.g. the runner rejected the
    /// submission outright).
    pub fn fail(&mut self, error: String, now: Timestamp) {
        self.status = ResearchStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        self.cursor += 1;
    }

    /// Move a non-terminal run to `cancelling` after the cancel
    /// request was forwarded to the runner.
    pub fn request_cancel(&mut self) -> MergeOutcome {
        if self.status.is_terminal() || self.status == ResearchStatus::Cancelling {
            return MergeOutcome::Rejected;
        }
        self.status = ResearchStatus::Cancelling;
        self.cursor += 1;
        MergeOutcome::Applied
    }

    /// Cancel a run that has no runner handle. There is nothing to
    /// poll for a confirmation, so the terminal `cancelled` lands
    /// immediately instead of parking the run in `cancelling`.
    pub fn cancel_now(&mut self, now: Timestamp) -> MergeOutcome {
        if self.status.is_terminal() {
            return MergeOutcome::Rejected;
        }
        self.status = ResearchStatus::Cancelled;
        self.completed_at = Some(now);
        self.cursor += 1;
        MergeOutcome::Applied
    }

    /// Merge a runner status report into this state.
    ///
    /// This is a read-modify-write helper: status transitions are
    /// checked against the monotonicity rules, activities are appended
    /// and deduplicated by id (never overwritten), and the cursor is
    /// bumped whenever anything was applied. In [`StateMode::Simple`]
    /// progress and activities are dropped.
    pub fn apply_update(
        &mut self,
        update: &RunUpdate,
        mode: StateMode,
        now: Timestamp,
    ) -> MergeOutcome {
        if !self.status.can_transition_to(update.status) {
            return MergeOutcome::Rejected;
        }

        let mut changed = false;

        if update.status != self.status {
            self.status = update.status;
            changed = true;
        }

        if mode == StateMode::Rich {
            if let Some(p) = update.progress {
                let clamped = p.clamp(0.0, 100.0);
                if self.progress != Some(clamped) {
                    self.progress = Some(clamped);
                    changed = true;
                }
            }
            changed |= self.append_activities(&update.activities);
        }

        match update.status {
            ResearchStatus::Completed => {
                if self.result != update.result {
                    self.result = update.result.clone();
                    changed = true;
                }
                if mode == StateMode::Rich && self.progress != Some(100.0) {
                    self.progress = Some(100.0);
                    changed = true;
                }
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                    changed = true;
                }
            }
            ResearchStatus::Failed => {
                if self.error != update.error && update.error.is_some() {
                    self.error = update.error.clone();
                    changed = true;
                }
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                    changed = true;
                }
            }
            ResearchStatus::Cancelled => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                    changed = true;
                }
            }
            _ => {}
        }

        if changed {
            self.cursor += 1;
            MergeOutcome::Applied
        } else {
            MergeOutcome::Unchanged
        }
    }

    /// Append activities not already present (by id), keeping the
    /// trail ordered by `created_at`. Returns whether anything was
    /// added.
    fn append_activities(&mut self, incoming: &[Activity]) -> bool {
        let mut added = false;
        for activity in incoming {
            if self.activities.iter().any(|a| a.id == activity.id) {
                continue;
            }
            self.activities.push(activity.clone());
            added = true;
        }
        if added {
            self.activities.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn activity(id: &str, secs: i64) -> Activity {
        Activity {
            id: id.into(),
            kind: "search".into(),
            label: format!("step {id}"),
            status: "done".into(),
            created_at: t(secs),
            url: None,
        }
    }

    fn update(status: ResearchStatus) -> RunUpdate {
        RunUpdate {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn queued_state_is_billed_once() {
        let state = ResearchState::queued(0.7, t(0));
        assert_eq!(state.credits_charged, Some(0.7));
        assert_eq!(state.billed_at, Some(t(0)));
        assert_eq!(state.status, ResearchStatus::Queued);
        assert!(state.blocks_new_run());
    }

    #[test]
    fn forward_transitions_apply_and_bump_cursor() {
        let mut state = ResearchState::queued(1.0, t(0));
        let before = state.cursor;
        let outcome = state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(1));
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(state.status, ResearchStatus::InProgress);
        assert_eq!(state.cursor, before + 1);
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let mut state = ResearchState::queued(1.0, t(0));
        state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(1));
        let snapshot = state.clone();
        let outcome = state.apply_update(&update(ResearchStatus::Queued), StateMode::Rich, t(2));
        assert_eq!(outcome, MergeOutcome::Rejected);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn terminal_state_never_transitions() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut done = update(ResearchStatus::Completed);
        done.result = Some("findings".into());
        state.apply_update(&done, StateMode::Rich, t(1));

        let snapshot = state.clone();
        let outcome = state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(2));
        assert_eq!(outcome, MergeOutcome::Rejected);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn completion_records_result_and_full_progress() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut done = update(ResearchStatus::Completed);
        done.result = Some("the findings".into());
        assert_eq!(
            state.apply_update(&done, StateMode::Rich, t(5)),
            MergeOutcome::Applied
        );
        assert_eq!(state.result.as_deref(), Some("the findings"));
        assert_eq!(state.progress, Some(100.0));
        assert_eq!(state.completed_at, Some(t(5)));
        assert!(!state.blocks_new_run());
    }

    #[test]
    fn failure_keeps_credits_charged() {
        let mut state = ResearchState::queued(0.7, t(0));
        let mut failed = update(ResearchStatus::Failed);
        failed.error = Some("runner exploded".into());
        state.apply_update(&failed, StateMode::Rich, t(3));
        assert_eq!(state.credits_charged, Some(0.7));
        assert_eq!(state.error.as_deref(), Some("runner exploded"));
    }

    #[test]
    fn activities_append_and_dedup_by_id() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut u = update(ResearchStatus::InProgress);
        u.activities = vec![activity("a", 2), activity("b", 1)];
        state.apply_update(&u, StateMode::Rich, t(1));

        // Re-delivering "a" plus a new "c" must not duplicate "a".
        let mut u2 = update(ResearchStatus::InProgress);
        u2.activities = vec![activity("a", 2), activity("c", 3)];
        state.apply_update(&u2, StateMode::Rich, t(2));

        let ids: Vec<&str> = state.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]); // ordered by created_at
    }

    #[test]
    fn identical_update_is_unchanged() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut u = update(ResearchStatus::InProgress);
        u.progress = Some(40.0);
        state.apply_update(&u, StateMode::Rich, t(1));
        let cursor = state.cursor;
        assert_eq!(
            state.apply_update(&u, StateMode::Rich, t(2)),
            MergeOutcome::Unchanged
        );
        assert_eq!(state.cursor, cursor);
    }

    #[test]
    fn simple_mode_strips_progress_and_activities() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut u = update(ResearchStatus::InProgress);
        u.progress = Some(55.0);
        u.activities = vec![activity("a", 1)];
        state.apply_update(&u, StateMode::Simple, t(1));
        assert_eq!(state.progress, None);
        assert!(state.activities.is_empty());
        assert_eq!(state.status, ResearchStatus::InProgress);
    }

    #[test]
    fn cancelling_blocks_new_run_and_lands_cancelled() {
        let mut state = ResearchState::queued(1.0, t(0));
        state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(1));
        assert_eq!(state.request_cancel(), MergeOutcome::Applied);
        assert!(state.blocks_new_run());

        state.apply_update(&update(ResearchStatus::Cancelled), StateMode::Rich, t(3));
        assert_eq!(state.status, ResearchStatus::Cancelled);
        assert!(!state.blocks_new_run());
    }

    #[test]
    fn cancel_now_lands_terminal_immediately() {
        let mut state = ResearchState::queued(1.0, t(0));
        assert_eq!(state.runner_job_id, None);
        assert_eq!(state.cancel_now(t(1)), MergeOutcome::Applied);
        assert_eq!(state.status, ResearchStatus::Cancelled);
        assert_eq!(state.completed_at, Some(t(1)));
        assert!(!state.blocks_new_run());
        // Terminal; a repeated cancel is rejected.
        assert_eq!(state.cancel_now(t(2)), MergeOutcome::Rejected);
    }

    #[test]
    fn cancelling_run_may_still_complete() {
        let mut state = ResearchState::queued(1.0, t(0));
        state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(1));
        state.request_cancel();
        let mut done = update(ResearchStatus::Completed);
        done.result = Some("finished anyway".into());
        assert_eq!(
            state.apply_update(&done, StateMode::Rich, t(2)),
            MergeOutcome::Applied
        );
    }

    #[test]
    fn requires_action_may_resume() {
        let mut state = ResearchState::queued(1.0, t(0));
        state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(1));
        state.apply_update(&update(ResearchStatus::RequiresAction), StateMode::Rich, t(2));
        assert_eq!(
            state.apply_update(&update(ResearchStatus::InProgress), StateMode::Rich, t(3)),
            MergeOutcome::Applied
        );
    }

    #[test]
    fn progress_is_clamped() {
        let mut state = ResearchState::queued(1.0, t(0));
        let mut u = update(ResearchStatus::InProgress);
        u.progress = Some(140.0);
        state.apply_update(&u, StateMode::Rich, t(1));
        assert_eq!(state.progress, Some(100.0));
    }
}
