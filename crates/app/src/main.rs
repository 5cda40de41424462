use std::sync::Arc;
use std::time::Duration;

use onboardflow_app::{
    build_scheduler, handler_table, seed_demo_instances, spawn_demo_reviewer, AppConfig,
};
use onboardflow_engine::{InMemoryEngine, ProcessApi};
use onboardflow_handlers::SimulatedAccountBackend;
use onboardflow_worker::CancellationToken;

const DEMO_REVIEW_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            onboardflow_observability::init();
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    onboardflow_observability::tracing::init(config.log_format);
    config.log_summary();

    let engine = InMemoryEngine::arc();
    let backend = Arc::new(SimulatedAccountBackend::new(config.account_latency));
    let scheduler = build_scheduler(&config, engine.clone(), handler_table(&config, backend));

    let shutdown = CancellationToken::new();
    let reviewer = (config.demo_auto_review && config.demo_instances > 0)
        .then(|| spawn_demo_reviewer(engine.clone(), DEMO_REVIEW_INTERVAL, shutdown.child_token()));

    let handle = scheduler.spawn(shutdown.clone());
    seed_demo_instances(&engine, config.demo_instances)?;
    tracing::info!(worker_id = %config.worker_id, "external task worker started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested; draining in-flight tasks");

    let stats = handle.shutdown().await;
    if let Some(reviewer) = reviewer {
        reviewer.await?;
    }
    tracing::info!(?stats, "external task worker stopped");

    for snapshot in engine.list_instances() {
        tracing::info!(
            process_instance_id = %snapshot.id,
            business_key = %snapshot.business_key,
            state = %snapshot.state,
            "final instance state"
        );
    }
    for incident in engine.incidents() {
        tracing::warn!(
            incident_id = %incident.id,
            topic = %incident.topic,
            message = %incident.message,
            "open incident"
        );
    }
    Ok(())
}
