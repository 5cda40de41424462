use thiserror::Error;

use onboardflow_core::{IncidentId, ProcessInstanceId, ReviewTaskId};
use onboardflow_workflow::{OnboardingState, TransitionError};

pub type ProcessResult<T> = Result<T, ProcessError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("process instance not found: {0}")]
    InstanceNotFound(ProcessInstanceId),

    #[error("review task not found: {0}")]
    ReviewNotFound(ReviewTaskId),

    #[error("incident not found: {0}")]
    IncidentNotFound(IncidentId),

    #[error("process instance {id} already ended in {state}")]
    AlreadyEnded {
        id: ProcessInstanceId,
        state: OnboardingState,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
