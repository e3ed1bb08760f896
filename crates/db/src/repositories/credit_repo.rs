//! Repository for the `credit_accounts` table.
//!
//! The debit is a single conditional UPDATE so the balance check and
//! the deduction are one atomic statement; a losing concurrent debit
//! simply matches zero rows.

use sqlx::PgPool;

use epistle_core::types::UserId;

use crate::models::CreditAccount;

/// Metered credit balance operations.
pub struct CreditRepo;

impl CreditRepo {
    /// Current balance, or `None` when the user has no account.
    pub async fn balance(pool: &PgPool, user_id: UserId) -> Result<Option<f64>, sqlx::Error> {
        let row: Option<(f64,)> =
            sqlx::query_as("SELECT balance FROM credit_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(balance,)| balance))
    }

    /// Atomically debit `amount` if the balance covers it.
    ///
    /// Returns the remaining balance, or `None` when the account is
    /// missing or the balance is insufficient (no state change).
    pub async fn debit(
        pool: &PgPool,
        user_id: UserId,
        amount: f64,
    ) -> Result<Option<f64>, sqlx::Error> {
        let row: Option<(f64,)> = sqlx::query_as(
            "UPDATE credit_accounts \
             SET balance = balance - $2, updated_at = NOW() \
             WHERE user_id = $1 AND balance >= $2 \
             RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(balance,)| balance))
    }

    /// Add credits to an account, creating it if needed. Returns the
    /// new balance. Used both for refunds and for top-ups recorded by
    /// the payment collaborator.
    pub async fn credit(pool: &PgPool, user_id: UserId, amount: f64) -> Result<f64, sqlx::Error> {
        let (balance,): (f64,) = sqlx::query_as(
            "INSERT INTO credit_accounts (user_id, balance) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE \
                 SET balance = credit_accounts.balance + EXCLUDED.balance, \
                     updated_at = NOW() \
             RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(pool)
        .await?;
        Ok(balance)
    }

    /// Fetch the full account row.
    pub async fn find(pool: &PgPool, user_id: UserId) -> Result<Option<CreditAccount>, sqlx::Error> {
        sqlx::query_as::<_, CreditAccount>(
            "SELECT user_id, balance, created_at, updated_at \
             FROM credit_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}
