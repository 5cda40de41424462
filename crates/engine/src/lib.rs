//! In-memory lock authority and onboarding process runtime.
//!
//! Intended for development and tests: it drives only the onboarding state
//! machine, keeps everything in memory, and serves the worker side through
//! [`onboardflow_worker::ExternalTaskService`].

pub mod api;
pub mod engine;
pub mod error;

pub use api::{Incident, InstanceSnapshot, PendingReview, ProcessApi};
pub use engine::InMemoryEngine;
pub use error::{ProcessError, ProcessResult};
