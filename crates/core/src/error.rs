//! Core error model.

use thiserror::Error;

/// Result type used across the core types.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while reading or building core values.
///
/// These are programming/data-shape faults, not business-rule violations:
/// handlers classify them as technical failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A variable was present but held a value of the wrong type.
    #[error("variable `{name}` is {found}, expected {expected}")]
    VariableType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn variable_type(name: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::VariableType {
            name: name.into(),
            expected,
            found,
        }
    }
}
