//! A running (or archived) onboarding process instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use onboardflow_core::{BusinessKey, ProcessInstanceId, Variables};

use crate::state::{transition, OnboardingState, TransitionError, Trigger};

/// Record of one transition taken by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: OnboardingState,
    pub to: OnboardingState,
    pub trigger: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: ProcessInstanceId,
    pub business_key: BusinessKey,
    state: OnboardingState,
    variables: Variables,
    history: Vec<StateChange>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the instance ended early (cancellation reason), if it did.
    pub end_reason: Option<String>,
}

impl ProcessInstance {
    /// Create an instance in `Started` with its initial variables.
    pub fn new(business_key: BusinessKey, variables: Variables) -> Self {
        Self {
            id: ProcessInstanceId::new(),
            business_key,
            state: OnboardingState::Started,
            variables,
            history: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn state(&self) -> OnboardingState {
        self.state
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// States visited so far, in order, including the current one.
    pub fn path(&self) -> Vec<OnboardingState> {
        let mut path = vec![OnboardingState::Started];
        path.extend(self.history.iter().map(|c| c.to));
        path
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    /// Overwrite-merge variables produced by a later stage.
    pub fn merge_variables(&mut self, variables: Variables) {
        self.variables.merge(variables);
    }

    /// Apply a trigger, recording the transition.
    ///
    /// The instance is left untouched when the trigger is not valid in the
    /// current state.
    pub fn apply(&mut self, trigger: &Trigger) -> Result<OnboardingState, TransitionError> {
        let next = transition(self.state, trigger)?;
        if self.path().contains(&next) {
            return Err(TransitionError::Revisit(next));
        }

        let now = Utc::now();
        self.history.push(StateChange {
            from: self.state,
            to: next,
            trigger: trigger.name().to_string(),
            at: now,
        });
        self.state = next;

        if next.is_terminal() {
            self.ended_at = Some(now);
            if let Trigger::Cancel { reason } = trigger {
                self.end_reason = Some(reason.clone());
            }
        }
        Ok(next)
    }
}
