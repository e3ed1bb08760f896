//! Domain logic for the letter-writing job core.
//!
//! This crate is pure: no I/O, no database, no HTTP. It holds the
//! snapshot/phase/research types and their transition rules, the field
//! cipher used for encryption at rest, and the async trait seams
//! (`store`) that the coordinator and the persistence layer meet at.

pub mod crypto;
pub mod error;
pub mod hashing;
pub mod intake;
pub mod phase;
pub mod research;
pub mod snapshot;
pub mod store;
pub mod types;
