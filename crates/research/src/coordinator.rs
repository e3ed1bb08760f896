//! Research coordinator.
//!
//! Owns the "at most one in-flight research run per job" guarantee,
//! the credit debit, and the merge of runner status reports into the
//! persisted snapshot. Start is serialized through a distributed lock
//! keyed by `job_id` so duplicate submissions (double-clicks, second
//! tabs) collapse into one debited run; the lock is held only until
//! the runner has accepted the submission, never to completion.

use std::time::Duration;

use epistle_core::error::CoreError;
use epistle_core::phase::Phase;
use epistle_core::research::{MergeOutcome, ResearchState, ResearchStatus, StateMode};
use epistle_core::snapshot::JobSnapshot;
use epistle_core::store::{CreditLedger, LockService, SnapshotStore};
use epistle_core::types::UserId;

use crate::prompt::build_research_prompt;
use crate::runner::ResearchRunner;

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Credits debited per research run.
    pub research_cost: f64,
    /// TTL on the submission lock (safety net for dead holders).
    pub lock_ttl: Duration,
    /// Rich (progress + activities) or result-only research state.
    pub mode: StateMode,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            research_cost: 1.0,
            lock_ttl: Duration::from_secs(30),
            mode: StateMode::Rich,
        }
    }
}

/// Outcome of a successful `start`.
#[derive(Debug)]
pub struct StartReceipt {
    pub job: JobSnapshot,
    pub remaining_credits: f64,
}

/// Rejections from `start`. Conflict-class variants carry the current
/// authoritative snapshot so the caller can reconcile instead of
/// guessing.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("A research run is already active for this job")]
    AlreadyActive(Box<JobSnapshot>),

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits {
        balance: f64,
        required: f64,
        job: Box<JobSnapshot>,
    },

    #[error("Job is not ready to start research")]
    NotReady(Box<JobSnapshot>),

    #[error("No job snapshot exists for this user")]
    NoJob,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Coordinates research runs against a snapshot store, credit ledger,
/// lock service, and the external runner.
pub struct ResearchCoordinator<S, L, K, R> {
    store: S,
    ledger: L,
    locks: K,
    runner: R,
    config: CoordinatorConfig,
}

impl<S, L, K, R> ResearchCoordinator<S, L, K, R>
where
    S: SnapshotStore,
    L: CreditLedger,
    K: LockService,
    R: ResearchRunner,
{
    pub fn new(store: S, ledger: L, locks: K, runner: R, config: CoordinatorConfig) -> Self {
        Self {
            store,
            ledger,
            locks,
            runner,
            config,
        }
    }

    /// Start a research run for the user's job.
    ///
    /// Rejected without any state change when a non-terminal run
    /// already exists (`cancelling` included), when the job is not at
    /// the summary (or past-research) stage, or when the balance does
    /// not cover the cost.
    pub async fn start(&self, user_id: UserId) -> Result<StartReceipt, StartError> {
        // The pre-lock check is advisory; the authoritative check
        // happens on the re-read inside `start_locked`, after the
        // lock closes the check-then-write race.
        let snapshot = self.store.get(user_id).await?.ok_or(StartError::NoJob)?;
        let job_id = snapshot.job_id;
        Self::check_startable(snapshot)?;
        let key = format!("research:{job_id}");

        let token = match self.locks.acquire(&key, self.config.lock_ttl).await? {
            Some(token) => token,
            None => {
                tracing::info!(%job_id, "Research start lock busy, rejecting duplicate");
                let current = self.store.get(user_id).await?.ok_or(StartError::NoJob)?;
                return Err(StartError::AlreadyActive(Box::new(current)));
            }
        };

        let result = self.start_locked(user_id).await;

        if let Err(e) = self.locks.release(&key, token).await {
            tracing::warn!(%job_id, error = %e, "Failed to release research start lock");
        }

        result
    }

    async fn start_locked(&self, user_id: UserId) -> Result<StartReceipt, StartError> {
        // Re-read under the lock: a concurrent start may have queued a
        // run between our first read and the acquisition.
        let snapshot = self.store.get(user_id).await?.ok_or(StartError::NoJob)?;
        Self::check_startable(snapshot.clone())?;

        let cost = self.config.research_cost;
        let remaining = match self.ledger.debit(user_id, cost).await {
            Ok(remaining) => remaining,
            Err(CoreError::InsufficientCredits { balance, required }) => {
                return Err(StartError::InsufficientCredits {
                    balance,
                    required,
                    job: Box::new(snapshot),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let now = chrono::Utc::now();
        let mut run = ResearchState::queued(cost, now);
        let persisted = self
            .store
            .update_research(user_id, Phase::Research, Some(&run))
            .await?;

        tracing::info!(
            job_id = %persisted.job_id,
            user_id = %user_id,
            credits_charged = cost,
            "Research run queued"
        );

        let prompt = build_research_prompt(&persisted);
        match self.runner.submit(&prompt).await {
            Ok(accepted) => {
                // A cancel may have landed while the submission was in
                // flight; re-read so the accept never reverts it.
                let current = self.store.get(user_id).await?.ok_or(StartError::NoJob)?;
                if let Some(mut cancelled) = current.research.filter(|r| {
                    matches!(
                        r.status,
                        ResearchStatus::Cancelling | ResearchStatus::Cancelled
                    )
                }) {
                    tracing::info!(
                        job_id = %current.job_id,
                        runner_job_id = %accepted.runner_job_id,
                        "Run cancelled during submission, forwarding cancel to runner"
                    );
                    if let Err(cancel_err) = self.runner.cancel(&accepted.runner_job_id).await {
                        tracing::warn!(
                            error = %cancel_err,
                            "Failed to cancel freshly accepted run"
                        );
                    }
                    cancelled.accept(accepted.runner_job_id);
                    let job = self
                        .store
                        .update_research(user_id, current.phase, Some(&cancelled))
                        .await?;
                    return Ok(StartReceipt {
                        job,
                        remaining_credits: remaining,
                    });
                }

                run.accept(accepted.runner_job_id);
                let job = self
                    .store
                    .update_research(user_id, Phase::Research, Some(&run))
                    .await?;
                Ok(StartReceipt {
                    job,
                    remaining_credits: remaining,
                })
            }
            Err(e) => {
                // The runner never accepted the job, so the run never
                // existed: refund the debit and record the failure.
                tracing::error!(user_id = %user_id, error = %e, "Research submission rejected");
                match self.ledger.refund(user_id, cost).await {
                    Ok(_) => {
                        run.credits_charged = None;
                        run.billed_at = None;
                    }
                    Err(refund_err) => {
                        // Keep the charge recorded so billing stays
                        // consistent with what was actually debited.
                        tracing::error!(user_id = %user_id, error = %refund_err, "Refund failed after rejected submission");
                    }
                }
                run.fail(format!("Research submission rejected: {e}"), chrono::Utc::now());
                self.store
                    .update_research(user_id, Phase::Research, Some(&run))
                    .await?;
                Err(StartError::Core(CoreError::Internal(format!(
                    "Research runner rejected the submission: {e}"
                ))))
            }
        }
    }

    fn check_startable(snapshot: JobSnapshot) -> Result<(), StartError> {
        if snapshot.active_research().is_some() {
            return Err(StartError::AlreadyActive(Box::new(snapshot)));
        }
        if !matches!(snapshot.phase, Phase::Summary | Phase::Research) {
            return Err(StartError::NotReady(Box::new(snapshot)));
        }
        Ok(())
    }

    /// Fetch the runner's latest report for the active run, merge it
    /// into the snapshot, and return the canonical snapshot.
    ///
    /// A no-op for jobs without an active run. The merge is a
    /// read-modify-write against the stored research sub-object:
    /// activities append and dedup, the status guard rejects backwards
    /// transitions, and the cursor bumps on every applied change.
    pub async fn status(&self, user_id: UserId) -> Result<JobSnapshot, CoreError> {
        let snapshot = self
            .store
            .get(user_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job" })?;

        let Some(run) = snapshot.research.clone() else {
            return Ok(snapshot);
        };
        if run.status.is_terminal() {
            return Ok(snapshot);
        }
        let Some(runner_job_id) = run.runner_job_id.clone() else {
            // Submission still in flight; nothing to poll yet.
            return Ok(snapshot);
        };

        let update = self
            .runner
            .status(&runner_job_id)
            .await
            .map_err(|e| CoreError::Internal(format!("Research status fetch failed: {e}")))?;

        let mut merged = run;
        match merged.apply_update(&update, self.config.mode, chrono::Utc::now()) {
            MergeOutcome::Applied => {
                tracing::debug!(
                    job_id = %snapshot.job_id,
                    status = ?merged.status,
                    cursor = merged.cursor,
                    "Applied research status update"
                );
                self.store
                    .update_research(user_id, snapshot.phase, Some(&merged))
                    .await
            }
            MergeOutcome::Unchanged => Ok(snapshot),
            MergeOutcome::Rejected => {
                tracing::warn!(
                    job_id = %snapshot.job_id,
                    current = ?merged.status,
                    incoming = ?update.status,
                    "Rejected non-monotonic research status update"
                );
                Ok(snapshot)
            }
        }
    }

    /// Request cancellation of the active run.
    ///
    /// Fire-and-forget: the run moves to `cancelling` once the request
    /// is forwarded, and later polls land the terminal `cancelled` (or
    /// `completed`/`failed` if the runner finished first). A run whose
    /// submission never recorded a runner handle has nothing to poll,
    /// so it lands the terminal `cancelled` directly. Idempotent while
    /// already `cancelling`.
    pub async fn cancel(&self, user_id: UserId) -> Result<JobSnapshot, CoreError> {
        let snapshot = self
            .store
            .get(user_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job" })?;

        let Some(run) = snapshot.research.clone().filter(|r| r.blocks_new_run()) else {
            return Err(CoreError::Conflict(
                "No active research run to cancel".into(),
            ));
        };

        if let Some(runner_job_id) = run.runner_job_id.as_deref() {
            self.runner
                .cancel(runner_job_id)
                .await
                .map_err(|e| CoreError::Internal(format!("Cancel request failed: {e}")))?;
        }

        let mut merged = run;
        let outcome = if merged.runner_job_id.is_some() {
            merged.request_cancel()
        } else {
            merged.cancel_now(chrono::Utc::now())
        };
        match outcome {
            MergeOutcome::Applied => {
                tracing::info!(
                    job_id = %snapshot.job_id,
                    status = ?merged.status,
                    "Research cancellation requested"
                );
                self.store
                    .update_research(user_id, snapshot.phase, Some(&merged))
                    .await
            }
            // Already cancelling; return the current state unchanged.
            _ => Ok(snapshot),
        }
    }
}
