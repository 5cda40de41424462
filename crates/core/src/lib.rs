//! `onboardflow-core`: shared building blocks for the onboarding workers.
//!
//! This crate contains **pure** types (no IO, no runtime): identifiers, typed
//! process variables, the leased task mirror, and the three-way handler
//! `Outcome` together with the `Execute` capability handlers implement.

pub mod error;
pub mod id;
pub mod outcome;
pub mod task;
pub mod variables;

pub use error::{CoreError, CoreResult};
pub use id::{BusinessKey, IncidentId, ProcessInstanceId, ReviewTaskId, TaskId, WorkerId};
pub use outcome::{Execute, Outcome, TechnicalFailure};
pub use task::{topics, ExternalTask};
pub use variables::Variables;
