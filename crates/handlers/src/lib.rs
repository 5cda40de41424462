//! Onboarding task handlers.
//!
//! One handler per topic, each implementing [`Execute`]. Dispatch is a closed
//! set: [`TaskHandler`] enumerates the variants and [`HandlerTable`] maps
//! topic names to them.
//!
//! Every fault inside a handler is classified before it leaves: business-rule
//! violations become `DomainError`, anything unexpected becomes
//! `TechnicalFailure`. `HandleError` always completes.

pub mod create_account;
pub mod handle_error;
pub mod table;
pub mod validate_data;

pub use create_account::{
    generate_account_id, AccountBackend, AccountRequest, BackendError, CreateAccount,
    OpenedAccount, SimulatedAccountBackend,
};
pub use handle_error::HandleError;
pub use table::{HandlerTable, TaskHandler};
pub use validate_data::{ValidateData, ValidationReport};

pub use onboardflow_core::Execute;

/// Timestamp format used for human-readable process variables.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
