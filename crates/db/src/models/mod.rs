//! Row models mapping table shapes to domain types.

pub mod credit;
pub mod job;

pub use credit::CreditAccount;
pub use job::JobRow;
