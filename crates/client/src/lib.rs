//! Client-side engine for the letter service: the HTTP API client,
//! the debounced autosave engine, and the research status poller.

pub mod api;
pub mod poller;
pub mod sync;

pub use api::{ApiError, LetterApiClient};
pub use poller::{PollerConfig, StatusPoller, StatusSource};
pub use sync::{SaveTarget, SyncConfig, SyncEngine};
