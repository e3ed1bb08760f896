//! Research coordination: the mutual-exclusion/billing core plus the
//! HTTP bridges to the external AI collaborators.

pub mod coordinator;
pub mod followup;
pub mod prompt;
pub mod runner;

pub use coordinator::{CoordinatorConfig, ResearchCoordinator, StartError, StartReceipt};
pub use followup::{FollowUpGenerator, GeneratorError, HttpFollowUpGenerator};
pub use runner::{AcceptedRun, HttpResearchRunner, ResearchRunner, RunnerError};
