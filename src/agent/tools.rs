use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::database::{DatabaseError, SqlDatabase};
use super::llm::{ChatMessage, ChatModel, LlmError, ToolSpec};
use super::prompt::query_checker_prompt;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
    #[error("missing required argument `{0}`")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[async_trait]
pub trait SqlTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn parameters(&self) -> Value;

    async fn call(&self, args: &Value) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec::function(self.name(), self.description(), self.parameters())
    }
}

fn string_arg<'a>(args: &'a Value, key: &'static str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or(ToolError::MissingArgument(key))
}

fn string_param(key: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            key: {"type": "string", "description": description}
        },
        "required": [key]
    })
}

pub struct ListTablesTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl SqlTool for ListTablesTool {
    fn name(&self) -> &'static str {
        "sql_db_list_tables"
    }

    fn description(&self) -> &'static str {
        "Input is an empty string, output is a comma-separated list of tables in the database."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: &Value) -> Result<String, ToolError> {
        Ok(self.db.table_names().await?.join(", "))
    }
}

pub struct SchemaTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl SqlTool for SchemaTool {
    fn name(&self) -> &'static str {
        "sql_db_schema"
    }

    fn description(&self) -> &'static str {
        "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
         Be sure that the tables actually exist by calling sql_db_list_tables first! \
         Example Input: table1, table2, table3"
    }

    fn parameters(&self) -> Value {
        string_param("table_names", "A comma-separated list of the table names for which to return the schema.")
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let tables: Vec<String> = string_arg(args, "table_names")?
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self.db.table_info(&tables).await?)
    }
}

pub struct QueryTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl SqlTool for QueryTool {
    fn name(&self) -> &'static str {
        "sql_db_query"
    }

    fn description(&self) -> &'static str {
        "Input to this tool is a detailed and correct SQL query, output is a result from the database. \
         If the query is not correct, an error message will be returned. \
         If an error is returned, rewrite the query, check the query, and try again. \
         If you encounter an issue with Unknown column 'xxxx' in 'field list', \
         use sql_db_schema to query the correct table fields."
    }

    fn parameters(&self) -> Value {
        string_param("query", "A detailed and correct SQL query.")
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let query = string_arg(args, "query")?;
        tracing::info!(query, "running agent query");
        Ok(self.db.run(query).await?)
    }
}

pub struct QueryCheckerTool {
    db: Arc<dyn SqlDatabase>,
    model: Arc<dyn ChatModel>,
}

#[async_trait]
impl SqlTool for QueryCheckerTool {
    fn name(&self) -> &'static str {
        "sql_db_query_checker"
    }

    fn description(&self) -> &'static str {
        "Use this tool to double check if your query is correct before executing it. \
         Always use this tool before executing a query with sql_db_query!"
    }

    fn parameters(&self) -> Value {
        string_param("query", "A detailed and SQL query to be checked.")
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let query = string_arg(args, "query")?;
        let prompt = query_checker_prompt(self.db.dialect(), query);
        let reply = self.model.complete(&[ChatMessage::user(prompt)], &[]).await?;
        Ok(reply.content().to_string())
    }
}

/// 绑定到同一个数据库和模型的一组工具
pub struct SqlToolkit {
    tools: Vec<Arc<dyn SqlTool>>,
}

impl SqlToolkit {
    pub fn new(db: Arc<dyn SqlDatabase>, model: Arc<dyn ChatModel>) -> Self {
        let tools: Vec<Arc<dyn SqlTool>> = vec![
            Arc::new(QueryTool { db: db.clone() }),
            Arc::new(SchemaTool { db: db.clone() }),
            Arc::new(ListTablesTool { db: db.clone() }),
            Arc::new(QueryCheckerTool { db, model }),
        ];
        Self { tools }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub async fn call(&self, name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args: Value = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_arguments)?
        };
        tool.call(&args).await
    }

    /// 出错时以 `Error: ...` 文本交还给模型，让它自行修正后重试
    pub async fn call_for_model(&self, name: &str, raw_arguments: &str) -> String {
        match self.call(name, raw_arguments).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                format!("Error: {}", e)
            }
        }
    }
}
