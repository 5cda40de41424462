//! Handler outcomes and the `Execute` capability.

use async_trait::async_trait;

use crate::task::ExternalTask;
use crate::variables::Variables;

/// Variable name carrying a business error code.
pub const ERROR_CODE: &str = "errorCode";

/// Upper bound for the diagnostic detail attached to a technical failure.
pub const MAX_DETAIL_LEN: usize = 1000;

/// Result of exactly one execution attempt of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Work done; variables are written back to the process.
    Completed { variables: Variables },
    /// Expected business-rule violation; routed through the error boundary.
    DomainError {
        code: String,
        message: String,
        variables: Variables,
    },
    /// Unexpected fault; subject to the topic's retry budget.
    TechnicalFailure(TechnicalFailure),
}

impl Outcome {
    /// Successful completion. A completion never carries an `errorCode`.
    pub fn completed(mut variables: Variables) -> Self {
        variables.remove(ERROR_CODE);
        Self::Completed { variables }
    }

    pub fn domain_error(
        code: impl Into<String>,
        message: impl Into<String>,
        variables: Variables,
    ) -> Self {
        Self::DomainError {
            code: code.into(),
            message: message.into(),
            variables,
        }
    }

    pub fn technical_failure(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TechnicalFailure(TechnicalFailure {
            message: message.into(),
            detail: detail.into(),
        })
    }

    /// Short label for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::DomainError { .. } => "domain_error",
            Outcome::TechnicalFailure(_) => "technical_failure",
        }
    }
}

/// Message and diagnostic detail of a technical failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechnicalFailure {
    pub message: String,
    pub detail: String,
}

impl TechnicalFailure {
    /// Build a failure from an error, rendering its source chain as the detail.
    pub fn from_error(context: &str, err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            message: format!("{context}: {err}"),
            detail: diagnostic_trace(err),
        }
    }
}

impl From<TechnicalFailure> for Outcome {
    fn from(value: TechnicalFailure) -> Self {
        Outcome::TechnicalFailure(value)
    }
}

/// Render an error and its `source()` chain, truncated to about
/// [`MAX_DETAIL_LEN`] characters.
pub fn diagnostic_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n\tcaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    truncate_detail(out)
}

fn truncate_detail(mut detail: String) -> String {
    if detail.chars().count() <= MAX_DETAIL_LEN {
        return detail;
    }
    let cut = detail
        .char_indices()
        .nth(MAX_DETAIL_LEN)
        .map(|(idx, _)| idx)
        .unwrap_or(detail.len());
    detail.truncate(cut);
    detail.push_str("... (truncated)");
    detail
}

/// Business logic bound to one topic.
///
/// Implementations must classify every fault into an [`Outcome`]; nothing
/// escapes the handler boundary uncategorised.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, task: &ExternalTask) -> Outcome;
}
