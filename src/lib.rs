use std::sync::Arc;

use config::Config;
use sqlx::PgPool;

pub mod agent;
pub mod assistant;
pub mod config;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod usage;

use agent::AgentFactory;
use routes::dashboard::QueryCache;
use usage::UsageGate;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub usage: Arc<UsageGate>,
    pub agents: Arc<dyn AgentFactory>,
    pub dashboard_cache: Arc<QueryCache>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, agents: Arc<dyn AgentFactory>) -> Self {
        let usage = Arc::new(UsageGate::new(config.usage_log.clone(), config.daily_limit));
        Self {
            pool,
            config,
            usage,
            agents,
            dashboard_cache: Arc::new(QueryCache::new()),
        }
    }
}
