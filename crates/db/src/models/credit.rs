use serde::Serialize;
use sqlx::FromRow;

use epistle_core::types::{Timestamp, UserId};

/// A row from the `credit_accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditAccount {
    pub user_id: UserId,
    pub balance: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
