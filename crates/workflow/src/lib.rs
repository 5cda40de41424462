//! Customer onboarding workflow (state machine only, no IO).
//!
//! - Explicit states and triggers (`state`)
//! - A process instance that records every transition it takes (`instance`)
//! - The start/review payloads exchanged with the process-management layer
//!   (`request`)
//!
//! Triggers come exclusively from task outcomes or the human review decision;
//! whoever owns the instance (the engine runtime) applies them.

pub mod instance;
pub mod request;
pub mod state;
pub mod vars;

pub use instance::{ProcessInstance, StateChange};
pub use request::{OnboardingRequest, ReviewDecision};
pub use state::{transition, ActiveStep, OnboardingState, TransitionError, Trigger};
