//! Maps handler outcomes to authority calls.

use std::collections::HashMap;

use tracing::{info, warn};

use onboardflow_core::outcome::ERROR_CODE;
use onboardflow_core::{ExternalTask, Outcome, TaskId, Variables, WorkerId};

use crate::authority::{AuthorityError, ExternalTaskService, FailureReport};
use crate::retry::RetryBudget;

/// What to tell the authority about one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Complete {
        variables: Variables,
    },
    BusinessError {
        code: String,
        message: String,
        variables: Variables,
    },
    Fail(FailureReport),
}

impl Resolution {
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Complete { .. } => "complete",
            Resolution::BusinessError { .. } => "business_error",
            Resolution::Fail(f) if f.is_incident() => "incident",
            Resolution::Fail(_) => "failure",
        }
    }

    /// Issue the matching authority call.
    pub async fn report<A>(
        &self,
        authority: &A,
        task_id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<(), AuthorityError>
    where
        A: ExternalTaskService + ?Sized,
    {
        match self {
            Resolution::Complete { variables } => {
                authority.complete(task_id, worker_id, variables.clone()).await
            }
            Resolution::BusinessError {
                code,
                message,
                variables,
            } => {
                authority
                    .throw_business_error(task_id, worker_id, code, message, variables.clone())
                    .await
            }
            Resolution::Fail(failure) => authority.report_failure(task_id, worker_id, failure).await,
        }
    }
}

/// Stateless resolver holding a retry budget per topic.
#[derive(Debug, Clone, Default)]
pub struct OutcomeResolver {
    budgets: HashMap<String, RetryBudget>,
    default_budget: RetryBudget,
}

impl OutcomeResolver {
    pub fn new(default_budget: RetryBudget) -> Self {
        Self {
            budgets: HashMap::new(),
            default_budget,
        }
    }

    pub fn with_budget(mut self, topic: impl Into<String>, budget: RetryBudget) -> Self {
        self.budgets.insert(topic.into(), budget);
        self
    }

    pub fn budget_for(&self, topic: &str) -> &RetryBudget {
        self.budgets.get(topic).unwrap_or(&self.default_budget)
    }

    pub fn resolve(&self, task: &ExternalTask, outcome: Outcome) -> Resolution {
        match outcome {
            Outcome::Completed { mut variables } => {
                // a completion must never look like a routed error
                variables.remove(ERROR_CODE);
                Resolution::Complete { variables }
            }
            Outcome::DomainError {
                code,
                message,
                variables,
            } => Resolution::BusinessError {
                code,
                message,
                variables,
            },
            Outcome::TechnicalFailure(failure) => {
                let decision = self.budget_for(&task.topic).on_failure(task.retries);
                let report = FailureReport {
                    message: failure.message,
                    detail: failure.detail,
                    retries: decision.remaining(),
                    retry_timeout: decision.delay(),
                };

                if report.is_incident() {
                    warn!(
                        task_id = %task.id,
                        topic = %task.topic,
                        error = %report.message,
                        "retries exhausted, task becomes an incident"
                    );
                } else {
                    info!(
                        task_id = %task.id,
                        topic = %task.topic,
                        remaining = report.retries,
                        retry_in_ms = report.retry_timeout.as_millis() as u64,
                        "technical failure, scheduling retry"
                    );
                }
                Resolution::Fail(report)
            }
        }
    }
}
