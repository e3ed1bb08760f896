//! Postgres implementations of the core trait seams.
//!
//! Thin adapters: each method delegates to a repository and maps
//! persistence errors into [`CoreError`] so the coordinator stays
//! storage-agnostic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use epistle_core::crypto::FieldCipher;
use epistle_core::error::CoreError;
use epistle_core::phase::Phase;
use epistle_core::research::ResearchState;
use epistle_core::snapshot::{JobSnapshot, SnapshotPayload};
use epistle_core::store::{CreditLedger, LockService, LockToken, SnapshotStore};
use epistle_core::types::UserId;

use crate::repositories::{CreditRepo, LockRepo, SnapshotRepo};
use crate::{DbError, DbPool};

fn internal(e: impl std::fmt::Display) -> CoreError {
    CoreError::Internal(e.to_string())
}

/// [`SnapshotStore`] backed by the `letter_jobs` table.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: DbPool,
    cipher: Arc<FieldCipher>,
}

impl PgSnapshotStore {
    pub fn new(pool: DbPool, cipher: Arc<FieldCipher>) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, user_id: UserId) -> Result<Option<JobSnapshot>, CoreError> {
        SnapshotRepo::get(&self.pool, &self.cipher, user_id)
            .await
            .map_err(internal)
    }

    async fn upsert(
        &self,
        user_id: UserId,
        payload: &SnapshotPayload,
    ) -> Result<JobSnapshot, CoreError> {
        SnapshotRepo::upsert(&self.pool, &self.cipher, user_id, payload)
            .await
            .map_err(internal)
    }

    async fn update_research(
        &self,
        user_id: UserId,
        phase: Phase,
        research: Option<&ResearchState>,
    ) -> Result<JobSnapshot, CoreError> {
        SnapshotRepo::update_research(&self.pool, &self.cipher, user_id, phase, research)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound { entity: "Job" })
    }

    async fn delete(&self, user_id: UserId) -> Result<(), CoreError> {
        SnapshotRepo::delete(&self.pool, user_id)
            .await
            .map_err(internal)
    }
}

/// [`CreditLedger`] backed by the `credit_accounts` table.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: DbPool,
}

impl PgCreditLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: UserId) -> Result<f64, CoreError> {
        Ok(CreditRepo::balance(&self.pool, user_id)
            .await
            .map_err(internal)?
            .unwrap_or(0.0))
    }

    async fn debit(&self, user_id: UserId, amount: f64) -> Result<f64, CoreError> {
        match CreditRepo::debit(&self.pool, user_id, amount)
            .await
            .map_err(internal)?
        {
            Some(remaining) => Ok(remaining),
            None => {
                let balance = self.balance(user_id).await?;
                Err(CoreError::InsufficientCredits {
                    balance,
                    required: amount,
                })
            }
        }
    }

    async fn refund(&self, user_id: UserId, amount: f64) -> Result<f64, CoreError> {
        CreditRepo::credit(&self.pool, user_id, amount)
            .await
            .map_err(internal)
    }
}

/// [`LockService`] backed by the `coordination_locks` table.
#[derive(Clone)]
pub struct PgLockService {
    pool: DbPool,
}

impl PgLockService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockService for PgLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, CoreError> {
        let token = LockRepo::acquire(&self.pool, key, ttl.as_secs_f64())
            .await
            .map_err(internal)?;
        Ok(token.map(LockToken))
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<(), CoreError> {
        LockRepo::release(&self.pool, key, token.0)
            .await
            .map_err(internal)?;
        Ok(())
    }
}

// Allow `DbError` to surface directly where handlers use repositories.
impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        CoreError::Internal(e.to_string())
    }
}
