//! Trait seams between the coordinator and its collaborators.
//!
//! The research coordinator is generic over these traits so the
//! production stack (Postgres repositories) and the test stack
//! (in-memory fakes) share one code path.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::research::ResearchState;
use crate::snapshot::{JobSnapshot, SnapshotPayload};
use crate::types::UserId;

/// Durable keyed storage for the single active job per user.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<JobSnapshot>, CoreError>;

    /// Create-or-update the user's snapshot from the editable payload.
    ///
    /// Mints the `job_id` on first persist and bumps `updated_at`;
    /// idempotent under an identical-payload retry. Never touches the
    /// research sub-state.
    async fn upsert(
        &self,
        user_id: UserId,
        payload: &SnapshotPayload,
    ) -> Result<JobSnapshot, CoreError>;

    /// Replace the research sub-state (and phase) in one write.
    ///
    /// This is the coordinator's half of the interleaving contract:
    /// it writes only the research column, so autosaves and status
    /// merges cannot clobber each other.
    async fn update_research(
        &self,
        user_id: UserId,
        phase: crate::phase::Phase,
        research: Option<&ResearchState>,
    ) -> Result<JobSnapshot, CoreError>;

    async fn delete(&self, user_id: UserId) -> Result<(), CoreError>;
}

/// Metered credit balance per user.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: UserId) -> Result<f64, CoreError>;

    /// Atomically debit `amount`; returns the remaining balance.
    ///
    /// Fails with [`CoreError::InsufficientCredits`] (and no state
    /// change) when the balance does not cover the amount.
    async fn debit(&self, user_id: UserId, amount: f64) -> Result<f64, CoreError>;

    /// Return previously debited credits (runner rejected the
    /// submission). Returns the new balance.
    async fn refund(&self, user_id: UserId, amount: f64) -> Result<f64, CoreError>;
}

/// Opaque proof of lock ownership; required to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub uuid::Uuid);

/// Distributed mutual exclusion with a TTL safety net.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take the lock. `Ok(None)` means another holder has it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, CoreError>;

    /// Release a held lock. Releasing with a stale token is a no-op.
    async fn release(&self, key: &str, token: LockToken) -> Result<(), CoreError>;
}
