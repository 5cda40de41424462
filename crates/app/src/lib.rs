//! Wiring for the onboarding worker binary: configuration, the scheduler
//! assembled from it, and the demo helpers that drive the in-memory engine.

pub mod config;
pub mod runtime;

pub use config::{AppConfig, ConfigError};
pub use runtime::{
    build_scheduler, handler_table, outcome_resolver, scheduler_config, seed_demo_instances,
    spawn_demo_reviewer, subscriptions,
};
