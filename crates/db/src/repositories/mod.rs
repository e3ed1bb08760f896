//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod credit_repo;
pub mod lock_repo;
pub mod snapshot_repo;

pub use credit_repo::CreditRepo;
pub use lock_repo::LockRepo;
pub use snapshot_repo::SnapshotRepo;
