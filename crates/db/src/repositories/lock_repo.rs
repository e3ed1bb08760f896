//! Repository for the `coordination_locks` table.
//!
//! A lock is a keyed row with an owner token and a TTL. Acquisition is
//! one INSERT .. ON CONFLICT statement: it wins either when no row
//! exists or when the existing lease has expired, which closes the
//! check-then-write race between two contenders. The TTL is a safety
//! net for holders that died without releasing.

use sqlx::PgPool;
use uuid::Uuid;

/// TTL-leased mutual exclusion keys.
pub struct LockRepo;

impl LockRepo {
    /// Try to take the lock for `key`.
    ///
    /// Returns the owner token on success, or `None` when another
    /// holder has an unexpired lease.
    pub async fn acquire(
        pool: &PgPool,
        key: &str,
        ttl_secs: f64,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let token = Uuid::new_v4();
        let row: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO coordination_locks (lock_key, token, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (lock_key) DO UPDATE \
                 SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at \
                 WHERE coordination_locks.expires_at < NOW() \
             RETURNING token",
        )
        .bind(key)
        .bind(token)
        .bind(ttl_secs)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(t,)| t))
    }

    /// Release a held lock. A stale or foreign token matches nothing
    /// and the call is a no-op.
    pub async fn release(pool: &PgPool, key: &str, token: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM coordination_locks WHERE lock_key = $1 AND token = $2",
        )
        .bind(key)
        .bind(token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
