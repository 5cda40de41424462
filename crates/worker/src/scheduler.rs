//! Per-topic polling scheduler.
//!
//! Each subscribed topic gets its own loop: long-poll the authority for up to
//! the free capacity, register each task's lease, execute it on its own task,
//! resolve the outcome and report it while the lease is live. Loops stop
//! polling once the shutdown token fires and then drain their in-flight work.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use onboardflow_core::{Execute, ExternalTask, Outcome, WorkerId};

use crate::authority::{ExternalTaskService, FetchAndLock};
use crate::lease::{Lease, LeaseRegistry};
use crate::resolver::{OutcomeResolver, Resolution};
use crate::retry::PollBackoff;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_id: WorkerId,
    /// Upper bound on tasks in flight per topic (and fetched per poll).
    pub max_tasks: usize,
    /// Lock duration for topics that do not set their own.
    pub lock_duration: Duration,
    /// Long-poll timeout passed to the authority.
    pub async_response_timeout: Duration,
    pub poll_backoff: PollBackoff,
    /// Results are not reported once less than this remains on the lease.
    pub lease_safety_margin: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::new("external-worker-1"),
            max_tasks: 10,
            lock_duration: Duration::from_millis(30_000),
            async_response_timeout: Duration::from_millis(20_000),
            poll_backoff: PollBackoff::default(),
            lease_safety_margin: Duration::from_millis(1_000),
        }
    }
}

impl SchedulerConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = WorkerId::new(worker_id);
        self
    }

    /// At least one task is always allowed in flight.
    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = max.max(1);
        self
    }
}

/// A topic this worker polls, optionally with its own lock duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscription {
    pub topic: String,
    pub lock_duration: Option<Duration>,
}

impl TopicSubscription {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            lock_duration: None,
        }
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = Some(lock_duration);
        self
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub polls: u64,
    pub poll_errors: u64,
    pub tasks_fetched: u64,
    pub tasks_completed: u64,
    pub business_errors: u64,
    pub failures_reported: u64,
    pub incidents: u64,
    /// Reports dropped because the lease was no longer live.
    pub reports_skipped: u64,
    /// Reports the authority refused (`LeaseLost`, `NotFound`).
    pub reports_rejected: u64,
    /// Fetched tasks already in flight under a live lease.
    pub duplicates_skipped: u64,
    pub in_flight: usize,
}

type SharedStats = Arc<Mutex<SchedulerStats>>;

fn record(stats: &SharedStats, f: impl FnOnce(&mut SchedulerStats)) {
    let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut s);
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    pollers: Vec<JoinHandle<()>>,
    stats: SharedStats,
}

impl SchedulerHandle {
    pub fn stats(&self) -> SchedulerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait until every poller has stopped and drained its in-flight tasks.
    pub async fn join(self) -> SchedulerStats {
        for poller in self.pollers {
            if let Err(err) = poller.await {
                error!(error = %err, "poller task failed");
            }
        }
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signal shutdown and wait for in-flight work to be reported.
    pub async fn shutdown(self) -> SchedulerStats {
        self.shutdown.cancel();
        self.join().await
    }
}

struct Context<A: ?Sized, H> {
    authority: Arc<A>,
    handler: Arc<H>,
    resolver: OutcomeResolver,
    leases: LeaseRegistry,
    config: SchedulerConfig,
    stats: SharedStats,
}

/// External task scheduler.
///
/// Generic over the lock authority and the handler; the handler is usually a
/// topic-keyed dispatch table.
pub struct Scheduler<A: ?Sized, H> {
    authority: Arc<A>,
    handler: Arc<H>,
    resolver: OutcomeResolver,
    config: SchedulerConfig,
    subscriptions: Vec<TopicSubscription>,
    leases: LeaseRegistry,
}

impl<A, H> Scheduler<A, H>
where
    A: ExternalTaskService + ?Sized + 'static,
    H: Execute + 'static,
{
    pub fn new(
        authority: Arc<A>,
        handler: Arc<H>,
        resolver: OutcomeResolver,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            authority,
            handler,
            resolver,
            config,
            subscriptions: Vec::new(),
            leases: LeaseRegistry::new(),
        }
    }

    pub fn subscribe(mut self, subscription: TopicSubscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn subscriptions(&self) -> &[TopicSubscription] {
        &self.subscriptions
    }

    /// Spawn one polling loop per subscription on the current runtime.
    pub fn spawn(mut self, shutdown: CancellationToken) -> SchedulerHandle {
        self.config.max_tasks = self.config.max_tasks.max(1);
        let stats = SharedStats::default();
        let ctx = Arc::new(Context {
            authority: self.authority,
            handler: self.handler,
            resolver: self.resolver,
            leases: self.leases,
            config: self.config,
            stats: stats.clone(),
        });

        let pollers = self
            .subscriptions
            .into_iter()
            .map(|sub| tokio::spawn(poll_topic(ctx.clone(), sub, shutdown.clone())))
            .collect();

        SchedulerHandle {
            shutdown,
            pollers,
            stats,
        }
    }
}

async fn poll_topic<A, H>(ctx: Arc<Context<A, H>>, sub: TopicSubscription, shutdown: CancellationToken)
where
    A: ExternalTaskService + ?Sized + 'static,
    H: Execute + 'static,
{
    let worker = ctx.config.worker_id.clone();
    let lock_duration = sub.lock_duration.unwrap_or(ctx.config.lock_duration);
    let mut backoff = ctx.config.poll_backoff.clone();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    info!(topic = %sub.topic, worker = %worker, lock_ms = lock_duration.as_millis() as u64, "poller started");

    loop {
        while let Some(res) = in_flight.try_join_next() {
            log_join_error(&sub.topic, res);
        }
        if shutdown.is_cancelled() {
            break;
        }

        let capacity = ctx.config.max_tasks.saturating_sub(in_flight.len());
        if capacity == 0 {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = in_flight.join_next() => {
                    if let Some(res) = res {
                        log_join_error(&sub.topic, res);
                    }
                }
            }
            continue;
        }

        let request = FetchAndLock {
            worker_id: worker.clone(),
            topics: vec![sub.topic.clone()],
            max_tasks: capacity,
            lock_duration,
            async_response_timeout: ctx.config.async_response_timeout,
        };

        // Deadlines are measured from before the request leaves.
        let acquired = Instant::now();
        let fetched = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = ctx.authority.fetch_and_lock(&request) => res,
        };
        record(&ctx.stats, |s| s.polls += 1);

        match fetched {
            Ok(tasks) => {
                backoff.reset();
                if !tasks.is_empty() {
                    debug!(topic = %sub.topic, count = tasks.len(), "fetched tasks");
                }
                for task in tasks {
                    record(&ctx.stats, |s| s.tasks_fetched += 1);
                    match ctx.leases.try_acquire(&task, acquired, lock_duration, Instant::now()) {
                        Some(lease) => {
                            in_flight.spawn(run_task(ctx.clone(), task, lease));
                        }
                        None => {
                            warn!(task_id = %task.id, topic = %sub.topic, "task already in flight, skipping");
                            record(&ctx.stats, |s| s.duplicates_skipped += 1);
                        }
                    }
                }
            }
            Err(err) => {
                record(&ctx.stats, |s| s.poll_errors += 1);
                let delay = backoff.next_delay();
                warn!(
                    topic = %sub.topic,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    consecutive_failures = backoff.consecutive_failures(),
                    "poll failed, backing off"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(topic = %sub.topic, in_flight = in_flight.len(), "poller stopping, draining in-flight tasks");
    while let Some(res) = in_flight.join_next().await {
        log_join_error(&sub.topic, res);
    }
    info!(topic = %sub.topic, "poller stopped");
}

fn log_join_error(topic: &str, res: Result<(), tokio::task::JoinError>) {
    if let Err(err) = res {
        error!(topic = %topic, error = %err, "task execution panicked");
    }
}

async fn run_task<A, H>(ctx: Arc<Context<A, H>>, task: ExternalTask, lease: Lease)
where
    A: ExternalTaskService + ?Sized + 'static,
    H: Execute + 'static,
{
    record(&ctx.stats, |s| s.in_flight += 1);
    let started = Instant::now();

    let handler = ctx.handler.clone();
    let leased = task.clone();
    let outcome = match tokio::spawn(async move { handler.execute(&leased).await }).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(task_id = %task.id, topic = %task.topic, error = %err, "handler panicked");
            Outcome::technical_failure("Handler panicked", panic_detail(err))
        }
    };
    debug!(
        task_id = %task.id,
        topic = %task.topic,
        outcome = outcome.kind(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "handler finished"
    );

    let resolution = ctx.resolver.resolve(&task, outcome);
    report(&ctx, &task, &lease, &resolution).await;

    ctx.leases.release(&lease);
    record(&ctx.stats, |s| s.in_flight = s.in_flight.saturating_sub(1));
}

fn panic_detail(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

async fn report<A, H>(ctx: &Context<A, H>, task: &ExternalTask, lease: &Lease, resolution: &Resolution)
where
    A: ExternalTaskService + ?Sized + 'static,
    H: Execute + 'static,
{
    let mut backoff = ctx.config.poll_backoff.clone();

    loop {
        let now = Instant::now();
        if !ctx.leases.is_current(lease) || !lease.is_live(now, ctx.config.lease_safety_margin) {
            warn!(
                task_id = %task.id,
                topic = %task.topic,
                resolution = resolution.kind(),
                "lease expired before resolution, not reporting"
            );
            record(&ctx.stats, |s| s.reports_skipped += 1);
            return;
        }

        match resolution
            .report(&*ctx.authority, task.id, &ctx.config.worker_id)
            .await
        {
            Ok(()) => {
                info!(task_id = %task.id, topic = %task.topic, resolution = resolution.kind(), "task resolved");
                record(&ctx.stats, |s| match resolution {
                    Resolution::Complete { .. } => s.tasks_completed += 1,
                    Resolution::BusinessError { .. } => s.business_errors += 1,
                    Resolution::Fail(f) if f.is_incident() => s.incidents += 1,
                    Resolution::Fail(_) => s.failures_reported += 1,
                });
                return;
            }
            Err(err) if err.is_transient() => {
                let delay = backoff.next_delay().min(lease.remaining(now));
                warn!(
                    task_id = %task.id,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "report failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "report rejected by authority");
                record(&ctx.stats, |s| s.reports_rejected += 1);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{AuthorityError, FailureReport};
    use crate::retry::RetryBudget;
    use async_trait::async_trait;
    use chrono::Utc;
    use onboardflow_core::{topics, Outcome, ProcessInstanceId, TaskId, Variables};
    use std::collections::{HashMap, VecDeque};

    #[derive(Debug, Clone, PartialEq)]
    enum Reported {
        Complete(TaskId),
        BusinessError(TaskId, String),
        Failure(TaskId, FailureReport),
    }

    /// Scripted authority: hands out queued batches, long-polls otherwise.
    #[derive(Default)]
    struct ScriptedAuthority {
        batches: Mutex<VecDeque<Result<Vec<ExternalTask>, AuthorityError>>>,
        reports: Mutex<Vec<Reported>>,
        report_outages: Mutex<u32>,
    }

    impl ScriptedAuthority {
        fn push(&self, batch: Result<Vec<ExternalTask>, AuthorityError>) {
            self.batches.lock().unwrap().push_back(batch);
        }

        fn reports(&self) -> Vec<Reported> {
            self.reports.lock().unwrap().clone()
        }

        fn accept(&self, r: Reported) -> Result<(), AuthorityError> {
            let mut outages = self.report_outages.lock().unwrap();
            if *outages > 0 {
                *outages -= 1;
                return Err(AuthorityError::unavailable("connection reset"));
            }
            self.reports.lock().unwrap().push(r);
            Ok(())
        }
    }

    #[async_trait]
    impl ExternalTaskService for ScriptedAuthority {
        async fn fetch_and_lock(&self, request: &FetchAndLock) -> Result<Vec<ExternalTask>, AuthorityError> {
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => {
                    tokio::time::sleep(request.async_response_timeout).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn complete(&self, id: TaskId, _: &WorkerId, _: Variables) -> Result<(), AuthorityError> {
            self.accept(Reported::Complete(id))
        }

        async fn throw_business_error(
            &self,
            id: TaskId,
            _: &WorkerId,
            code: &str,
            _: &str,
            _: Variables,
        ) -> Result<(), AuthorityError> {
            self.accept(Reported::BusinessError(id, code.to_string()))
        }

        async fn report_failure(&self, id: TaskId, _: &WorkerId, f: &FailureReport) -> Result<(), AuthorityError> {
            self.accept(Reported::Failure(id, f.clone()))
        }
    }

    /// Handler returning a fixed outcome after a delay.
    struct Fixed {
        delay: Duration,
        outcome: Outcome,
    }

    #[async_trait]
    impl Execute for Fixed {
        async fn execute(&self, _: &ExternalTask) -> Outcome {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    fn task(retries: Option<u32>) -> ExternalTask {
        ExternalTask {
            id: TaskId::new(),
            topic: topics::VALIDATE_DATA.to_string(),
            process_instance_id: ProcessInstanceId::new(),
            business_key: None,
            variables: Variables::new(),
            retries,
            worker_id: WorkerId::new("external-worker-1"),
            lock_expiration_time: Utc::now(),
        }
    }

    fn start(
        authority: Arc<ScriptedAuthority>,
        handler: Fixed,
        config: SchedulerConfig,
    ) -> SchedulerHandle {
        let resolver = OutcomeResolver::new(RetryBudget::exponential(3, Duration::from_secs(5), 2.0));
        Scheduler::new(authority, Arc::new(handler), resolver, config)
            .subscribe(TopicSubscription::new(topics::VALIDATE_DATA))
            .spawn(CancellationToken::new())
    }

    fn completes_after(delay: Duration) -> Fixed {
        Fixed {
            delay,
            outcome: Outcome::completed(Variables::new().with("isValid", true)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_task_is_reported() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let handle = start(authority.clone(), completes_after(Duration::from_millis(10)), SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn business_error_is_thrown() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let handler = Fixed {
            delay: Duration::ZERO,
            outcome: Outcome::domain_error("VALIDATION_ERROR", "Invalid email format.", Variables::new()),
        };
        let handle = start(authority.clone(), handler, SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        assert_eq!(
            authority.reports(),
            vec![Reported::BusinessError(t.id, "VALIDATION_ERROR".to_string())]
        );
        assert_eq!(stats.business_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn technical_failure_reports_retry_budget() {
        let authority = Arc::new(ScriptedAuthority::default());
        let first = task(None);
        let last = task(Some(1));
        authority.push(Ok(vec![first.clone(), last.clone()]));

        let handler = Fixed {
            delay: Duration::ZERO,
            outcome: Outcome::technical_failure("boom", "boom"),
        };
        let handle = start(authority.clone(), handler, SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        let reports = authority.reports();
        assert_eq!(reports.len(), 2);
        for r in reports {
            match r {
                Reported::Failure(id, f) if id == first.id => {
                    assert_eq!((f.retries, f.retry_timeout), (3, Duration::from_secs(5)));
                }
                Reported::Failure(id, f) if id == last.id => {
                    assert_eq!((f.retries, f.retry_timeout), (0, Duration::ZERO));
                }
                other => panic!("unexpected report {other:?}"),
            }
        }
        assert_eq!(stats.failures_reported, 1);
        assert_eq!(stats.incidents, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_not_reported() {
        let authority = Arc::new(ScriptedAuthority::default());
        authority.push(Ok(vec![task(None)]));

        let config = SchedulerConfig {
            lock_duration: Duration::from_secs(2),
            lease_safety_margin: Duration::from_millis(500),
            ..SchedulerConfig::default()
        };
        let handle = start(authority.clone(), completes_after(Duration::from_secs(5)), config);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let stats = handle.shutdown().await;

        assert!(authority.reports().is_empty());
        assert_eq!(stats.reports_skipped, 1);
        assert_eq!(stats.tasks_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn task_in_flight_is_not_dispatched_twice() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));
        authority.push(Ok(vec![t.clone()]));

        let handle = start(authority.clone(), completes_after(Duration::from_secs(3)), SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = handle.shutdown().await;

        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(stats.tasks_fetched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_back_off_and_recover() {
        let authority = Arc::new(ScriptedAuthority::default());
        authority.push(Err(AuthorityError::unavailable("connection refused")));
        authority.push(Err(AuthorityError::unavailable("connection refused")));
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let handle = start(authority.clone(), completes_after(Duration::ZERO), SchedulerConfig::default());
        // 500ms + 1000ms of backoff before the third poll.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stats = handle.shutdown().await;

        assert_eq!(stats.poll_errors, 2);
        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_report_is_retried_while_lease_is_live() {
        let authority = Arc::new(ScriptedAuthority::default());
        *authority.report_outages.lock().unwrap() = 2;
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let handle = start(authority.clone(), completes_after(Duration::ZERO), SchedulerConfig::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = handle.shutdown().await;

        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
        assert_eq!(stats.tasks_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_in_flight_work() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let handle = start(authority.clone(), completes_after(Duration::from_secs(3)), SchedulerConfig::default());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.stats().in_flight, 1);

        let stats = handle.shutdown().await;
        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_requests_only_free_capacity() {
        struct Recording {
            requested: Mutex<Vec<usize>>,
            inner: ScriptedAuthority,
        }

        #[async_trait]
        impl ExternalTaskService for Recording {
            async fn fetch_and_lock(&self, r: &FetchAndLock) -> Result<Vec<ExternalTask>, AuthorityError> {
                self.requested.lock().unwrap().push(r.max_tasks);
                self.inner.fetch_and_lock(r).await
            }
            async fn complete(&self, id: TaskId, w: &WorkerId, v: Variables) -> Result<(), AuthorityError> {
                self.inner.complete(id, w, v).await
            }
            async fn throw_business_error(
                &self,
                id: TaskId,
                w: &WorkerId,
                c: &str,
                m: &str,
                v: Variables,
            ) -> Result<(), AuthorityError> {
                self.inner.throw_business_error(id, w, c, m, v).await
            }
            async fn report_failure(&self, id: TaskId, w: &WorkerId, f: &FailureReport) -> Result<(), AuthorityError> {
                self.inner.report_failure(id, w, f).await
            }
        }

        let authority = Arc::new(Recording {
            requested: Mutex::new(Vec::new()),
            inner: ScriptedAuthority::default(),
        });
        authority.inner.push(Ok(vec![task(None), task(None)]));

        let resolver = OutcomeResolver::default();
        let handle = Scheduler::new(
            authority.clone(),
            Arc::new(completes_after(Duration::from_secs(60))),
            resolver,
            SchedulerConfig::default().with_max_tasks(3),
        )
        .subscribe(TopicSubscription::new(topics::VALIDATE_DATA))
        .spawn(CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown().await;

        let requested = authority.requested.lock().unwrap().clone();
        assert_eq!(&requested[..2], &[3, 1]);
    }

    struct Panics;

    #[async_trait]
    impl Execute for Panics {
        async fn execute(&self, _: &ExternalTask) -> Outcome {
            panic!("variable store corrupted")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_counts_against_retry_budget() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let resolver = OutcomeResolver::new(RetryBudget::fixed(3, Duration::from_secs(5)));
        let handle = Scheduler::new(authority.clone(), Arc::new(Panics), resolver, SchedulerConfig::default())
            .subscribe(TopicSubscription::new(topics::VALIDATE_DATA))
            .spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        match authority.reports().as_slice() {
            [Reported::Failure(id, f)] => {
                assert_eq!(*id, t.id);
                assert_eq!(f.message, "Handler panicked");
                assert!(f.detail.contains("variable store corrupted"));
                assert_eq!((f.retries, f.retry_timeout), (3, Duration::from_secs(5)));
            }
            other => panic!("unexpected reports {other:?}"),
        }
        assert_eq!(stats.failures_reported, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_on_last_attempt_becomes_an_incident() {
        let authority = Arc::new(ScriptedAuthority::default());
        authority.push(Ok(vec![task(Some(1))]));

        let handle = Scheduler::new(authority.clone(), Arc::new(Panics), OutcomeResolver::default(), SchedulerConfig::default())
            .subscribe(TopicSubscription::new(topics::VALIDATE_DATA))
            .spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        assert_eq!(stats.incidents, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn max_tasks_is_at_least_one() {
        assert_eq!(SchedulerConfig::default().with_max_tasks(0).max_tasks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_tasks_still_makes_progress() {
        let authority = Arc::new(ScriptedAuthority::default());
        let t = task(None);
        authority.push(Ok(vec![t.clone()]));

        let config = SchedulerConfig {
            max_tasks: 0,
            ..SchedulerConfig::default()
        };
        let handle = start(authority.clone(), completes_after(Duration::from_millis(10)), config);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = handle.shutdown().await;

        assert_eq!(authority.reports(), vec![Reported::Complete(t.id)]);
        assert!(stats.polls >= 1);
    }

    /// Authority with a queue per topic; polls every 100ms until the timeout.
    #[derive(Default)]
    struct PerTopicAuthority {
        queues: Mutex<HashMap<String, VecDeque<ExternalTask>>>,
        inner: ScriptedAuthority,
    }

    impl PerTopicAuthority {
        fn offer(&self, t: ExternalTask) {
            self.queues
                .lock()
                .unwrap()
                .entry(t.topic.clone())
                .or_default()
                .push_back(t);
        }
    }

    #[async_trait]
    impl ExternalTaskService for PerTopicAuthority {
        async fn fetch_and_lock(&self, r: &FetchAndLock) -> Result<Vec<ExternalTask>, AuthorityError> {
            let deadline = Instant::now() + r.async_response_timeout;
            loop {
                let batch: Vec<ExternalTask> = {
                    let mut queues = self.queues.lock().unwrap();
                    let queue = queues.entry(r.topics[0].clone()).or_default();
                    let n = r.max_tasks.min(queue.len());
                    queue.drain(..n).collect()
                };
                if !batch.is_empty() || Instant::now() >= deadline {
                    return Ok(batch);
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        async fn complete(&self, id: TaskId, w: &WorkerId, v: Variables) -> Result<(), AuthorityError> {
            self.inner.complete(id, w, v).await
        }
        async fn throw_business_error(
            &self,
            id: TaskId,
            w: &WorkerId,
            c: &str,
            m: &str,
            v: Variables,
        ) -> Result<(), AuthorityError> {
            self.inner.throw_business_error(id, w, c, m, v).await
        }
        async fn report_failure(&self, id: TaskId, w: &WorkerId, f: &FailureReport) -> Result<(), AuthorityError> {
            self.inner.report_failure(id, w, f).await
        }
    }

    /// Blocks on `validateData`, completes everything else at once.
    struct SlowValidation;

    #[async_trait]
    impl Execute for SlowValidation {
        async fn execute(&self, task: &ExternalTask) -> Outcome {
            if task.topic == topics::VALIDATE_DATA {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Outcome::completed(Variables::new())
        }
    }

    fn task_on(topic: &str) -> ExternalTask {
        ExternalTask {
            topic: topic.to_string(),
            ..task(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_topic_does_not_stall_other_topics() {
        let authority = Arc::new(PerTopicAuthority::default());
        let slow = task_on(topics::VALIDATE_DATA);
        authority.offer(slow.clone());
        authority.offer(task_on(topics::VALIDATE_DATA));

        let config = SchedulerConfig {
            lock_duration: Duration::from_secs(120),
            ..SchedulerConfig::default().with_max_tasks(1)
        };
        let handle = Scheduler::new(authority.clone(), Arc::new(SlowValidation), OutcomeResolver::default(), config)
            .subscribe(TopicSubscription::new(topics::VALIDATE_DATA))
            .subscribe(TopicSubscription::new(topics::CREATE_ACCOUNT))
            .spawn(CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.stats().in_flight, 1);

        let fast = task_on(topics::CREATE_ACCOUNT);
        authority.offer(fast.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(authority.inner.reports(), vec![Reported::Complete(fast.id)]);
        assert_eq!(handle.stats().in_flight, 1);
        handle.shutdown().await;
    }
}
