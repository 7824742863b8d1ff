use std::sync::Arc;

use super::database::PgDatabase;
use super::llm::OpenAiChatClient;
use super::{AgentError, SqlAgent};
use crate::config::Config;

/// 按数据库名创建问答代理
pub trait AgentFactory: Send + Sync {
    fn create_agent(&self, db_name: &str) -> Result<SqlAgent, AgentError>;
}

pub struct SqlAgentFactory {
    config: Config,
}

impl SqlAgentFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl AgentFactory for SqlAgentFactory {
    fn create_agent(&self, db_name: &str) -> Result<SqlAgent, AgentError> {
        let db = PgDatabase::connect_lazy(&self.config.database_url(db_name))?;
        let model = OpenAiChatClient::from_config(&self.config)?;
        tracing::info!(db_name, model = model.model(), "sql agent created");

        Ok(SqlAgent::new(
            Arc::new(model),
            Arc::new(db),
            self.config.agent_recursion_limit,
        ))
    }
}
