//! Onboarding states and the transition table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use onboardflow_core::topics;

/// The states an onboarding instance passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    #[default]
    Started,
    Validating,
    ValidationFailed,
    AwaitingReview,
    CreatingAccount,
    HandlingError,
    Rejected,
    Completed,
    Failed,
    /// Explicit cancellation through the process-management surface.
    Cancelled,
}

impl OnboardingState {
    pub const ALL: [OnboardingState; 10] = [
        OnboardingState::Started,
        OnboardingState::Validating,
        OnboardingState::ValidationFailed,
        OnboardingState::AwaitingReview,
        OnboardingState::CreatingAccount,
        OnboardingState::HandlingError,
        OnboardingState::Rejected,
        OnboardingState::Completed,
        OnboardingState::Failed,
        OnboardingState::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OnboardingState::Rejected
                | OnboardingState::Completed
                | OnboardingState::Failed
                | OnboardingState::Cancelled
        )
    }

    /// The external step an instance in this state is waiting on.
    pub fn active_step(self) -> Option<ActiveStep> {
        match self {
            OnboardingState::Validating => Some(ActiveStep::ValidateData),
            OnboardingState::AwaitingReview => Some(ActiveStep::ReviewDocuments),
            OnboardingState::CreatingAccount => Some(ActiveStep::CreateAccount),
            OnboardingState::HandlingError => Some(ActiveStep::HandleError),
            _ => None,
        }
    }
}

impl core::fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

/// A wait point of the process: either a worker topic or the human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActiveStep {
    ValidateData,
    ReviewDocuments,
    CreateAccount,
    HandleError,
}

impl ActiveStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ActiveStep::ValidateData => topics::VALIDATE_DATA,
            ActiveStep::ReviewDocuments => "reviewDocuments",
            ActiveStep::CreateAccount => topics::CREATE_ACCOUNT,
            ActiveStep::HandleError => topics::HANDLE_ERROR,
        }
    }

    /// External task topic for worker-driven steps; `None` for the review.
    pub fn topic(self) -> Option<&'static str> {
        match self {
            ActiveStep::ReviewDocuments => None,
            other => Some(other.as_str()),
        }
    }
}

/// What moves an instance from one state to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Automatic continuation: start event, or the error boundary handing
    /// over to error handling.
    Proceed,
    /// The active worker task completed normally.
    TaskCompleted,
    /// The active worker task threw a business error.
    BusinessError { code: String },
    /// The human review decided on `documentsApproved`.
    ReviewDecision { approved: bool },
    /// Explicit cancellation.
    Cancel { reason: String },
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Proceed => "proceed",
            Trigger::TaskCompleted => "task_completed",
            Trigger::BusinessError { .. } => "business_error",
            Trigger::ReviewDecision { .. } => "review_decision",
            Trigger::Cancel { .. } => "cancel",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition from {from} on {trigger}")]
    Invalid {
        from: OnboardingState,
        trigger: &'static str,
    },

    #[error("transition to {0} would revisit a state")]
    Revisit(OnboardingState),
}

/// Pure transition function.
pub fn transition(
    from: OnboardingState,
    trigger: &Trigger,
) -> Result<OnboardingState, TransitionError> {
    use OnboardingState as S;

    let next = match (from, trigger) {
        (S::Started, Trigger::Proceed) => S::Validating,
        (S::Validating, Trigger::TaskCompleted) => S::AwaitingReview,
        (S::Validating, Trigger::BusinessError { .. }) => S::ValidationFailed,
        (S::ValidationFailed, Trigger::Proceed) => S::HandlingError,
        (S::AwaitingReview, Trigger::ReviewDecision { approved: true }) => S::CreatingAccount,
        (S::AwaitingReview, Trigger::ReviewDecision { approved: false }) => S::Rejected,
        (S::CreatingAccount, Trigger::TaskCompleted) => S::Completed,
        (S::HandlingError, Trigger::TaskCompleted) => S::Failed,
        (s, Trigger::Cancel { .. }) if !s.is_terminal() => S::Cancelled,
        _ => {
            return Err(TransitionError::Invalid {
                from,
                trigger: trigger.name(),
            });
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error() -> Trigger {
        Trigger::BusinessError {
            code: "VALIDATION_ERROR".to_string(),
        }
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut s = OnboardingState::default();
        for trigger in [
            Trigger::Proceed,
            Trigger::TaskCompleted,
            Trigger::ReviewDecision { approved: true },
            Trigger::TaskCompleted,
        ] {
            s = transition(s, &trigger).unwrap();
        }
        assert_eq!(s, OnboardingState::Completed);
    }

    #[test]
    fn rejected_review_is_terminal() {
        let s = transition(
            OnboardingState::AwaitingReview,
            &Trigger::ReviewDecision { approved: false },
        )
        .unwrap();
        assert_eq!(s, OnboardingState::Rejected);
        assert!(s.is_terminal());
    }

    #[test]
    fn validation_error_cannot_jump_to_failed() {
        let s = transition(OnboardingState::Validating, &error()).unwrap();
        assert_eq!(s, OnboardingState::ValidationFailed);

        // Completing from ValidationFailed is not a path: error handling must run first.
        assert!(transition(s, &Trigger::TaskCompleted).is_err());

        let s = transition(s, &Trigger::Proceed).unwrap();
        assert_eq!(s, OnboardingState::HandlingError);
        let s = transition(s, &Trigger::TaskCompleted).unwrap();
        assert_eq!(s, OnboardingState::Failed);
    }

    #[test]
    fn business_errors_only_route_from_validation() {
        for s in OnboardingState::ALL {
            let result = transition(s, &error());
            if s == OnboardingState::Validating {
                assert!(result.is_ok());
            } else {
                assert!(result.is_err(), "{s} accepted a business error");
            }
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let triggers = [
            Trigger::Proceed,
            Trigger::TaskCompleted,
            error(),
            Trigger::ReviewDecision { approved: true },
            Trigger::Cancel {
                reason: "late".to_string(),
            },
        ];
        for s in OnboardingState::ALL.into_iter().filter(|s| s.is_terminal()) {
            for t in &triggers {
                assert!(transition(s, t).is_err(), "{s} accepted {}", t.name());
            }
        }
    }

    #[test]
    fn active_steps_map_to_topics() {
        assert_eq!(
            OnboardingState::Validating.active_step().and_then(ActiveStep::topic),
            Some(topics::VALIDATE_DATA)
        );
        assert_eq!(
            OnboardingState::AwaitingReview.active_step(),
            Some(ActiveStep::ReviewDocuments)
        );
        assert_eq!(ActiveStep::ReviewDocuments.topic(), None);
        assert_eq!(OnboardingState::Completed.active_step(), None);
    }
}
