use std::sync::Arc;

use epistle_db::{PgCreditLedger, PgLockService, PgSnapshotStore};
use epistle_research::{
    FollowUpGenerator, HttpResearchRunner, ResearchCoordinator,
};

use crate::config::ServerConfig;

/// The production coordinator wiring: Postgres stores and the HTTP
/// research runner.
pub type AppCoordinator =
    ResearchCoordinator<PgSnapshotStore, PgCreditLedger, PgLockService, HttpResearchRunner>;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: epistle_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Snapshot persistence (encrypting store over `letter_jobs`).
    pub store: PgSnapshotStore,
    /// Credit accounts.
    pub ledger: PgCreditLedger,
    /// Research run coordinator (locking, billing, status merges).
    pub coordinator: Arc<AppCoordinator>,
    /// Follow-up question generator.
    pub followups: Arc<dyn FollowUpGenerator>,
}
