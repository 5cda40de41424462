//! Process-management surface and the read models it returns.

use chrono::{DateTime, Utc};
use serde::Serialize;

use onboardflow_core::{
    BusinessKey, IncidentId, ProcessInstanceId, ReviewTaskId, TaskId, Variables,
};
use onboardflow_workflow::{ActiveStep, OnboardingState, ProcessInstance, ReviewDecision, StateChange};

use crate::error::ProcessResult;

/// Operations offered to whoever manages onboarding instances.
pub trait ProcessApi: Send + Sync {
    fn start_instance(
        &self,
        business_key: BusinessKey,
        variables: Variables,
    ) -> ProcessResult<ProcessInstanceId>;

    fn get_instance_state(&self, id: ProcessInstanceId) -> ProcessResult<InstanceSnapshot>;

    fn submit_review_decision(
        &self,
        review_task_id: ReviewTaskId,
        decision: ReviewDecision,
    ) -> ProcessResult<OnboardingState>;

    fn cancel_instance(&self, id: ProcessInstanceId, reason: &str) -> ProcessResult<()>;

    fn list_instances(&self) -> Vec<InstanceSnapshot>;

    fn pending_reviews(&self) -> Vec<PendingReview>;

    fn incidents(&self) -> Vec<Incident>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub id: ProcessInstanceId,
    pub business_key: BusinessKey,
    pub state: OnboardingState,
    pub active_step: Option<ActiveStep>,
    pub variables: Variables,
    pub history: Vec<StateChange>,
    pub ended: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

impl From<&ProcessInstance> for InstanceSnapshot {
    fn from(p: &ProcessInstance) -> Self {
        Self {
            id: p.id,
            business_key: p.business_key.clone(),
            state: p.state(),
            active_step: p.state().active_step(),
            variables: p.variables().clone(),
            history: p.history().to_vec(),
            ended: p.is_ended(),
            started_at: p.started_at,
            ended_at: p.ended_at,
            end_reason: p.end_reason.clone(),
        }
    }
}

/// A document review waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReview {
    pub id: ReviewTaskId,
    pub process_instance_id: ProcessInstanceId,
    pub business_key: BusinessKey,
    /// Instance variables at the time the review was opened.
    pub variables: Variables,
    pub created_at: DateTime<Utc>,
}

/// A task that exhausted its retries. Operational alert, not a process error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub id: IncidentId,
    pub task_id: TaskId,
    pub process_instance_id: ProcessInstanceId,
    pub topic: String,
    pub message: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
