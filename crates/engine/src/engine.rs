//! In-memory authority: tasks, leases, instances, reviews and incidents
//! behind a single lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use onboardflow_core::{
    BusinessKey, ExternalTask, IncidentId, ProcessInstanceId, ReviewTaskId, TaskId, Variables,
    WorkerId,
};
use onboardflow_worker::{AuthorityError, ExternalTaskService, FailureReport, FetchAndLock};
use onboardflow_workflow::{
    transition, ActiveStep, OnboardingRequest, OnboardingState, ProcessInstance, ReviewDecision,
    Trigger,
};

use crate::api::{Incident, InstanceSnapshot, PendingReview, ProcessApi};
use crate::error::{ProcessError, ProcessResult};

#[derive(Debug, Clone)]
struct TaskLock {
    worker_id: WorkerId,
    expires: Instant,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    id: TaskId,
    topic: String,
    process_instance_id: ProcessInstanceId,
    retries: Option<u32>,
    lock: Option<TaskLock>,
    /// Earliest instant the task may be fetched again after a failure.
    not_before: Option<Instant>,
    incident: Option<IncidentId>,
    seq: u64,
}

impl TaskRecord {
    fn is_available(&self, now: Instant) -> bool {
        self.incident.is_none()
            && self.lock.as_ref().is_none_or(|l| l.expires <= now)
            && self.not_before.is_none_or(|t| t <= now)
    }

    /// When an unavailable task becomes fetchable without outside help.
    fn available_at(&self) -> Option<Instant> {
        if self.incident.is_some() {
            return None;
        }
        let lock = self.lock.as_ref().map(|l| l.expires);
        match (lock, self.not_before) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    instances: HashMap<ProcessInstanceId, ProcessInstance>,
    tasks: HashMap<TaskId, TaskRecord>,
    reviews: HashMap<ReviewTaskId, PendingReview>,
    incidents: HashMap<IncidentId, Incident>,
    next_seq: u64,
}

impl State {
    /// Apply `trigger` and open whatever the new state waits on. Automatic
    /// continuations (the error boundary) are followed immediately.
    fn advance(&mut self, id: ProcessInstanceId, trigger: Trigger) -> ProcessResult<OnboardingState> {
        let mut trigger = trigger;
        loop {
            let instance = self
                .instances
                .get_mut(&id)
                .ok_or(ProcessError::InstanceNotFound(id))?;
            let state = instance.apply(&trigger)?;
            info!(
                process_instance_id = %id,
                business_key = %instance.business_key,
                trigger = trigger.name(),
                state = %state,
                "instance transitioned"
            );

            match state.active_step() {
                Some(ActiveStep::ReviewDocuments) => self.open_review(id),
                Some(step) => {
                    if let Some(topic) = step.topic() {
                        self.create_task(id, topic);
                    }
                }
                None if state == OnboardingState::ValidationFailed => {
                    trigger = Trigger::Proceed;
                    continue;
                }
                None => {}
            }
            return Ok(state);
        }
    }

    fn create_task(&mut self, process_instance_id: ProcessInstanceId, topic: &str) {
        self.next_seq += 1;
        let id = TaskId::new();
        self.tasks.insert(
            id,
            TaskRecord {
                id,
                topic: topic.to_string(),
                process_instance_id,
                retries: None,
                lock: None,
                not_before: None,
                incident: None,
                seq: self.next_seq,
            },
        );
        debug!(task_id = %id, topic = %topic, process_instance_id = %process_instance_id, "task created");
    }

    fn open_review(&mut self, process_instance_id: ProcessInstanceId) {
        let Some(instance) = self.instances.get(&process_instance_id) else {
            return;
        };
        let review = PendingReview {
            id: ReviewTaskId::new(),
            process_instance_id,
            business_key: instance.business_key.clone(),
            variables: instance.variables().clone(),
            created_at: Utc::now(),
        };
        debug!(review_task_id = %review.id, process_instance_id = %process_instance_id, "review opened");
        self.reviews.insert(review.id, review);
    }

    /// Lease available tasks. Also returns the earliest instant a currently
    /// unavailable task on the requested topics frees up.
    fn lease_tasks(&mut self, request: &FetchAndLock, now: Instant) -> (Vec<ExternalTask>, Option<Instant>) {
        let mut leased = Vec::new();
        let mut next_wake: Option<Instant> = None;

        for topic in &request.topics {
            let mut candidates: Vec<(u64, TaskId)> = Vec::new();
            for t in self.tasks.values().filter(|t| &t.topic == topic) {
                if t.is_available(now) {
                    candidates.push((t.seq, t.id));
                } else if let Some(at) = t.available_at() {
                    next_wake = Some(next_wake.map_or(at, |n| n.min(at)));
                }
            }
            candidates.sort_unstable();
            candidates.truncate(request.max_tasks);

            let expires_at: DateTime<Utc> =
                Utc::now() + chrono::Duration::from_std(request.lock_duration).unwrap_or_default();

            for (_, task_id) in candidates {
                let Some(record) = self.tasks.get_mut(&task_id) else {
                    continue;
                };
                let Some(instance) = self.instances.get(&record.process_instance_id) else {
                    continue;
                };

                record.lock = Some(TaskLock {
                    worker_id: request.worker_id.clone(),
                    expires: now + request.lock_duration,
                });
                record.not_before = None;

                leased.push(ExternalTask {
                    id: record.id,
                    topic: record.topic.clone(),
                    process_instance_id: record.process_instance_id,
                    business_key: Some(instance.business_key.clone()),
                    variables: instance.variables().clone(),
                    retries: record.retries,
                    worker_id: request.worker_id.clone(),
                    lock_expiration_time: expires_at,
                });
            }
        }

        (leased, next_wake)
    }

    fn check_lease(&self, task_id: TaskId, worker_id: &WorkerId, now: Instant) -> Result<&TaskRecord, AuthorityError> {
        let record = self
            .tasks
            .get(&task_id)
            .ok_or(AuthorityError::NotFound(task_id))?;
        match &record.lock {
            Some(lock) if &lock.worker_id == worker_id && now < lock.expires => Ok(record),
            _ => Err(AuthorityError::LeaseLost(task_id)),
        }
    }

    fn raise_incident(&mut self, task_id: TaskId, message: String, detail: String) -> Option<IncidentId> {
        let record = self.tasks.get_mut(&task_id)?;
        let id = IncidentId::new();
        record.lock = None;
        record.retries = Some(0);
        record.incident = Some(id);

        warn!(
            incident_id = %id,
            task_id = %task_id,
            topic = %record.topic,
            process_instance_id = %record.process_instance_id,
            error = %message,
            "incident raised"
        );
        self.incidents.insert(
            id,
            Incident {
                id,
                task_id,
                process_instance_id: record.process_instance_id,
                topic: record.topic.clone(),
                message,
                detail,
                created_at: Utc::now(),
            },
        );
        Some(id)
    }

    fn merge_into_instance(&mut self, id: ProcessInstanceId, variables: Variables) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.merge_variables(variables);
        }
    }
}

/// In-memory lock authority and process runtime.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: RwLock<State>,
    work_available: Notify,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an onboarding instance under a freshly generated business key.
    pub fn start_onboarding(
        &self,
        request: OnboardingRequest,
    ) -> ProcessResult<(ProcessInstanceId, BusinessKey)> {
        let business_key = BusinessKey::generate();
        let variables = request.into_variables(&business_key);
        let id = self.start_instance(business_key.clone(), variables)?;
        Ok((id, business_key))
    }

    /// Put an incident's task back in circulation with `retries` attempts.
    pub fn retry_incident(&self, incident_id: IncidentId, retries: u32) -> ProcessResult<()> {
        {
            let mut st = self.write();
            let incident = st
                .incidents
                .remove(&incident_id)
                .ok_or(ProcessError::IncidentNotFound(incident_id))?;
            if let Some(record) = st.tasks.get_mut(&incident.task_id) {
                record.incident = None;
                record.retries = Some(retries.max(1));
                record.not_before = None;
            }
            info!(incident_id = %incident_id, task_id = %incident.task_id, retries, "incident retried");
        }
        self.work_available.notify_waiters();
        Ok(())
    }

    fn complete_task(&self, task_id: TaskId, worker_id: &WorkerId, variables: Variables) -> Result<(), AuthorityError> {
        let result = {
            let mut st = self.write();
            let instance_id = st.check_lease(task_id, worker_id, Instant::now())?.process_instance_id;
            st.tasks.remove(&task_id);
            st.merge_into_instance(instance_id, variables);
            st.advance(instance_id, Trigger::TaskCompleted)
        };
        self.after_transition(task_id, result)
    }

    fn throw_error(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        code: &str,
        message: &str,
        variables: Variables,
    ) -> Result<(), AuthorityError> {
        let trigger = Trigger::BusinessError {
            code: code.to_string(),
        };

        let result = {
            let mut st = self.write();
            let instance_id = st.check_lease(task_id, worker_id, Instant::now())?.process_instance_id;
            let caught = st
                .instances
                .get(&instance_id)
                .is_some_and(|p| transition(p.state(), &trigger).is_ok());

            if !caught {
                st.raise_incident(
                    task_id,
                    format!("Unhandled business error {code}: {message}"),
                    String::new(),
                );
                return Ok(());
            }

            st.tasks.remove(&task_id);
            st.merge_into_instance(instance_id, variables);
            st.advance(instance_id, trigger)
        };
        self.after_transition(task_id, result)
    }

    fn fail_task(&self, task_id: TaskId, worker_id: &WorkerId, failure: &FailureReport) -> Result<(), AuthorityError> {
        {
            let mut st = self.write();
            let now = Instant::now();
            st.check_lease(task_id, worker_id, now)?;

            if failure.is_incident() {
                st.raise_incident(task_id, failure.message.clone(), failure.detail.clone());
            } else if let Some(record) = st.tasks.get_mut(&task_id) {
                record.lock = None;
                record.retries = Some(failure.retries);
                record.not_before = Some(now + failure.retry_timeout);
                info!(
                    task_id = %task_id,
                    topic = %record.topic,
                    retries = failure.retries,
                    retry_in_ms = failure.retry_timeout.as_millis() as u64,
                    error = %failure.message,
                    "task failure recorded"
                );
            }
        }
        self.work_available.notify_waiters();
        Ok(())
    }

    fn after_transition(&self, task_id: TaskId, result: ProcessResult<OnboardingState>) -> Result<(), AuthorityError> {
        match result {
            Ok(_) => {
                self.work_available.notify_waiters();
                Ok(())
            }
            Err(err) => {
                error!(task_id = %task_id, error = %err, "task outcome could not advance its instance");
                Err(AuthorityError::NotFound(task_id))
            }
        }
    }
}

#[async_trait]
impl ExternalTaskService for InMemoryEngine {
    async fn fetch_and_lock(&self, request: &FetchAndLock) -> Result<Vec<ExternalTask>, AuthorityError> {
        let deadline = Instant::now() + request.async_response_timeout;

        loop {
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let (tasks, next_wake) = self.write().lease_tasks(request, now);
            if !tasks.is_empty() {
                debug!(worker = %request.worker_id, count = tasks.len(), "tasks locked");
                return Ok(tasks);
            }
            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_wake.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn complete(&self, task_id: TaskId, worker_id: &WorkerId, variables: Variables) -> Result<(), AuthorityError> {
        self.complete_task(task_id, worker_id, variables)
    }

    async fn throw_business_error(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        code: &str,
        message: &str,
        variables: Variables,
    ) -> Result<(), AuthorityError> {
        self.throw_error(task_id, worker_id, code, message, variables)
    }

    async fn report_failure(
        &self,
        task_id: TaskId,
        worker_id: &WorkerId,
        failure: &FailureReport,
    ) -> Result<(), AuthorityError> {
        self.fail_task(task_id, worker_id, failure)
    }
}

impl ProcessApi for InMemoryEngine {
    fn start_instance(&self, business_key: BusinessKey, variables: Variables) -> ProcessResult<ProcessInstanceId> {
        let instance = ProcessInstance::new(business_key, variables);
        let id = instance.id;
        info!(process_instance_id = %id, business_key = %instance.business_key, "starting onboarding instance");
        {
            let mut st = self.write();
            st.instances.insert(id, instance);
            st.advance(id, Trigger::Proceed)?;
        }
        self.work_available.notify_waiters();
        Ok(id)
    }

    fn get_instance_state(&self, id: ProcessInstanceId) -> ProcessResult<InstanceSnapshot> {
        self.read()
            .instances
            .get(&id)
            .map(InstanceSnapshot::from)
            .ok_or(ProcessError::InstanceNotFound(id))
    }

    fn submit_review_decision(
        &self,
        review_task_id: ReviewTaskId,
        decision: ReviewDecision,
    ) -> ProcessResult<OnboardingState> {
        let state = {
            let mut st = self.write();
            let review = st
                .reviews
                .remove(&review_task_id)
                .ok_or(ProcessError::ReviewNotFound(review_task_id))?;
            let approved = decision.approved;
            info!(
                review_task_id = %review_task_id,
                process_instance_id = %review.process_instance_id,
                approved,
                "review decision submitted"
            );
            st.merge_into_instance(review.process_instance_id, decision.into_variables());
            st.advance(review.process_instance_id, Trigger::ReviewDecision { approved })?
        };
        self.work_available.notify_waiters();
        Ok(state)
    }

    fn cancel_instance(&self, id: ProcessInstanceId, reason: &str) -> ProcessResult<()> {
        let mut st = self.write();
        let state = st
            .instances
            .get(&id)
            .ok_or(ProcessError::InstanceNotFound(id))?
            .state();
        if state.is_terminal() {
            return Err(ProcessError::AlreadyEnded { id, state });
        }

        st.tasks.retain(|_, t| t.process_instance_id != id);
        st.reviews.retain(|_, r| r.process_instance_id != id);
        st.incidents.retain(|_, i| i.process_instance_id != id);
        st.advance(
            id,
            Trigger::Cancel {
                reason: reason.to_string(),
            },
        )?;
        info!(process_instance_id = %id, reason = %reason, "instance cancelled");
        Ok(())
    }

    fn list_instances(&self) -> Vec<InstanceSnapshot> {
        let st = self.read();
        let mut out: Vec<InstanceSnapshot> = st.instances.values().map(InstanceSnapshot::from).collect();
        out.sort_by_key(|s| s.started_at);
        out
    }

    fn pending_reviews(&self) -> Vec<PendingReview> {
        let st = self.read();
        let mut out: Vec<PendingReview> = st.reviews.values().cloned().collect();
        out.sort_by_key(|r| r.created_at);
        out
    }

    fn incidents(&self) -> Vec<Incident> {
        let st = self.read();
        let mut out: Vec<Incident> = st.incidents.values().cloned().collect();
        out.sort_by_key(|i| i.created_at);
        out
    }
}
