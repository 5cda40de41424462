//! The lock authority port.
//!
//! The authority owns tasks and their leases. Workers only ever see copies of
//! tasks they currently hold a lease on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use onboardflow_core::{ExternalTask, TaskId, Variables, WorkerId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The authority could not be reached. Retry with backoff.
    #[error("lock authority unavailable: {0}")]
    Unavailable(String),

    /// The caller no longer holds the lease on this task.
    #[error("lease on task {0} is not held by this worker")]
    LeaseLost(TaskId),

    #[error("task not found: {0}")]
    NotFound(TaskId),
}

impl AuthorityError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AuthorityError::Unavailable(_))
    }
}

/// One fetch-and-lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAndLock {
    pub worker_id: WorkerId,
    pub topics: Vec<String>,
    /// Upper bound on tasks returned per topic.
    pub max_tasks: usize,
    pub lock_duration: Duration,
    /// How long the authority may hold the request open waiting for work.
    pub async_response_timeout: Duration,
}

/// A technical failure as reported to the authority.
///
/// `retries == 0` turns the task into an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub message: String,
    pub detail: String,
    pub retries: u32,
    pub retry_timeout: Duration,
}

impl FailureReport {
    pub fn is_incident(&self) -> bool {
        self.retries == 0
    }
}

#[async_trait]
pub trait ExternalTaskService: Send + Sync {
    /// Lease up to `max_tasks` unlocked (or expired) tasks per topic.
    async fn fetch_and_lock(&self, request: &FetchAndLock) -> Result<Vec<ExternalTask>, AuthorityError>;

    async fn complete(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        variables: Variables,
    ) -> Result<(), AuthorityError>;

    async fn throw_business_error(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        code: &str,
        message: &str,
        variables: Variables,
    ) -> Result<(), AuthorityError>;

    async fn report_failure(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        failure: &FailureReport,
    ) -> Result<(), AuthorityError>;
}
