use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use onboardflow_core::{topics, ProcessInstanceId};
use onboardflow_engine::{InMemoryEngine, ProcessApi, ProcessResult};
use onboardflow_handlers::{AccountBackend, HandlerTable};
use onboardflow_worker::{
    CancellationToken, ExternalTaskService, OutcomeResolver, PollBackoff, Scheduler,
    SchedulerConfig, TopicSubscription,
};
use onboardflow_workflow::{OnboardingRequest, ReviewDecision};

use crate::config::AppConfig;

pub fn handler_table(config: &AppConfig, backend: Arc<dyn AccountBackend>) -> HandlerTable {
    HandlerTable::onboarding(backend, config.account_call_timeout)
}

pub fn outcome_resolver(config: &AppConfig) -> OutcomeResolver {
    topics::ALL
        .into_iter()
        .fold(OutcomeResolver::default(), |resolver, topic| {
            match config.retry_budget(topic) {
                Some(budget) => resolver.with_budget(topic, budget.clone()),
                None => resolver,
            }
        })
}

pub fn scheduler_config(config: &AppConfig) -> SchedulerConfig {
    SchedulerConfig {
        lock_duration: config.lock_duration,
        async_response_timeout: config.async_response_timeout,
        poll_backoff: PollBackoff::new(
            config.backoff_initial,
            config.backoff_multiplier,
            config.backoff_max,
        ),
        lease_safety_margin: config.lease_safety_margin,
        ..SchedulerConfig::default()
    }
    .with_worker_id(config.worker_id.as_str())
    .with_max_tasks(config.max_tasks)
}

/// One subscription per onboarding topic; error handling gets its own lease.
pub fn subscriptions(config: &AppConfig) -> Vec<TopicSubscription> {
    vec![
        TopicSubscription::new(topics::VALIDATE_DATA),
        TopicSubscription::new(topics::CREATE_ACCOUNT),
        TopicSubscription::new(topics::HANDLE_ERROR)
            .with_lock_duration(config.handle_error_lock_duration),
    ]
}

pub fn build_scheduler<A>(
    config: &AppConfig,
    authority: Arc<A>,
    handlers: HandlerTable,
) -> Scheduler<A, HandlerTable>
where
    A: ExternalTaskService + ?Sized + 'static,
{
    subscriptions(config).into_iter().fold(
        Scheduler::new(
            authority,
            Arc::new(handlers),
            outcome_resolver(config),
            scheduler_config(config),
        ),
        Scheduler::subscribe,
    )
}

const DEMO_CUSTOMERS: [(&str, &str, &str); 4] = [
    ("Ada Lovelace", "ada@example.com", "PASSPORT"),
    ("Grace Hopper", "grace@example.com", "ID"),
    ("Alan Turing", "alan.example.com", "ID"),
    ("", "nobody@example.com", "LIBRARY_CARD"),
];

/// Start `count` instances, cycling through customers that pass and fail
/// validation.
pub fn seed_demo_instances(
    engine: &InMemoryEngine,
    count: usize,
) -> ProcessResult<Vec<ProcessInstanceId>> {
    DEMO_CUSTOMERS
        .iter()
        .cycle()
        .take(count)
        .map(|(name, email, doc)| {
            let (id, business_key) =
                engine.start_onboarding(OnboardingRequest::new(*name, *email, *doc))?;
            info!(process_instance_id = %id, business_key = %business_key, "demo instance started");
            Ok(id)
        })
        .collect()
}

/// Approve every pending review on each tick until `shutdown` fires.
pub fn spawn_demo_reviewer(
    engine: Arc<InMemoryEngine>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            for review in engine.pending_reviews() {
                match engine.submit_review_decision(review.id, ReviewDecision::approve("auto-approved")) {
                    Ok(state) => info!(
                        review_task_id = %review.id,
                        process_instance_id = %review.process_instance_id,
                        state = %state,
                        "demo review approved"
                    ),
                    Err(e) => warn!(review_task_id = %review.id, error = %e, "demo review failed"),
                }
            }
        }
    })
}
