//! 基于工具调用的 SQL 问答代理
//!
//! 代理循环：模型回复 -> 执行其请求的工具 -> 把结果交还模型，直到模型给出
//! 不带工具调用的最终回答。每次状态变化都会产出一个 [`AgentStep`]。

mod database;
mod factory;
mod llm;
mod prompt;
mod tools;

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::Stream;
use serde::Serialize;
use uuid::Uuid;

pub use database::{DatabaseError, PgDatabase, SqlDatabase};
pub use factory::{AgentFactory, SqlAgentFactory};
pub use llm::{ChatMessage, ChatModel, FunctionCall, LlmError, OpenAiChatClient, ToolCall, ToolSpec};
pub use prompt::{DEFAULT_TOP_K, query_checker_prompt, system_prompt};
pub use tools::{SqlTool, SqlToolkit, ToolError};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("recursion limit of {0} reached without a final answer")]
    RecursionLimit(usize),
}

/// 代理运行中的一个状态快照：当前对话的最后一条消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStep {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
}

impl AgentStep {
    fn from_message(message: &ChatMessage) -> Self {
        Self {
            role: message.role(),
            content: message.content().to_string(),
            tool_calls: message
                .tool_calls()
                .iter()
                .map(|call| call.function.name.clone())
                .collect(),
        }
    }
}

pub struct SqlAgent {
    model: Arc<dyn ChatModel>,
    toolkit: SqlToolkit,
    system_prompt: String,
    recursion_limit: usize,
}

impl SqlAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        db: Arc<dyn SqlDatabase>,
        recursion_limit: usize,
    ) -> Self {
        let system_prompt = system_prompt(db.dialect(), DEFAULT_TOP_K);
        let toolkit = SqlToolkit::new(db, model.clone());
        Self {
            model,
            toolkit,
            system_prompt,
            recursion_limit,
        }
    }

    pub fn toolkit(&self) -> &SqlToolkit {
        &self.toolkit
    }

    /// 流式运行一轮问答；最后一个 step 的内容即最终回答
    pub fn stream(&self, question: &str) -> impl Stream<Item = Result<AgentStep, AgentError>> + Send + '_ {
        let question = question.to_string();
        let specs = self.toolkit.specs();
        let limit = self.recursion_limit;

        try_stream! {
            let run_id = Uuid::new_v4();
            let mut messages = vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(question),
            ];
            tracing::info!(%run_id, "agent run started");
            yield AgentStep::from_message(&messages[1]);

            // 每次模型回复和每轮工具执行各算一步
            let mut steps = 0usize;
            loop {
                if steps >= limit {
                    tracing::warn!(%run_id, limit, "agent hit recursion limit");
                    Err::<(), _>(AgentError::RecursionLimit(limit))?;
                }
                let reply = self.model.complete(&messages, &specs).await?;
                steps += 1;

                let calls = reply.tool_calls().to_vec();
                let step = AgentStep::from_message(&reply);
                tracing::debug!(%run_id, steps, tools = ?step.tool_calls, "model replied");
                messages.push(reply);
                yield step;

                if calls.is_empty() {
                    break;
                }
                if steps >= limit {
                    tracing::warn!(%run_id, limit, "agent hit recursion limit");
                    Err::<(), _>(AgentError::RecursionLimit(limit))?;
                }

                let mut last = None;
                for call in &calls {
                    let output = self
                        .toolkit
                        .call_for_model(&call.function.name, &call.function.arguments)
                        .await;
                    let message = ChatMessage::tool(call.id.clone(), output);
                    last = Some(AgentStep::from_message(&message));
                    messages.push(message);
                }
                steps += 1;
                if let Some(step) = last {
                    yield step;
                }
            }
            tracing::info!(%run_id, steps, "agent run finished");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的假模型和假数据库

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// 按顺序返回预设回复，并记录收到的每次对话
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<ChatMessage>>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<ChatMessage>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ChatMessage, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::EmptyResponse)
        }
    }

    pub struct FakeDatabase;

    #[async_trait]
    impl SqlDatabase for FakeDatabase {
        fn dialect(&self) -> &str {
            "PostgreSQL"
        }

        async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
            Ok(vec![
                "customers".into(),
                "inventory".into(),
                "medicines".into(),
                "sales".into(),
            ])
        }

        async fn table_info(&self, tables: &[String]) -> Result<String, DatabaseError> {
            let known = self.table_names().await?;
            let missing: Vec<String> = tables.iter().filter(|t| !known.contains(t)).cloned().collect();
            if !missing.is_empty() {
                return Err(DatabaseError::UnknownTables(missing));
            }
            Ok(tables
                .iter()
                .map(|t| format!("CREATE TABLE {} ()", t))
                .collect::<Vec<_>>()
                .join("\n\n"))
        }

        async fn run(&self, sql: &str) -> Result<String, DatabaseError> {
            if sql.contains("revenue") {
                Ok(r#"[{"name":"Paracetamol","revenue":1520.0}]"#.to_string())
            } else {
                Err(DatabaseError::Sqlx(sqlx::Error::Protocol(format!(
                    "column does not exist: {}",
                    sql
                ))))
            }
        }
    }

    pub fn tool_reply(calls: Vec<ToolCall>) -> ChatMessage {
        ChatMessage::Assistant {
            content: None,
            tool_calls: calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::pin::pin;

    async fn collect(agent: &SqlAgent, question: &str) -> Vec<Result<AgentStep, AgentError>> {
        let mut stream = pin!(agent.stream(question));
        let mut out = Vec::new();
        while let Some(step) = stream.next().await {
            out.push(step);
        }
        out
    }

    #[tokio::test]
    async fn answers_after_tool_round_trip() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_reply(vec![ToolCall::new("c1", "sql_db_list_tables", json!({}))]),
            tool_reply(vec![ToolCall::new(
                "c2",
                "sql_db_query",
                json!({"query": "SELECT name, revenue FROM top LIMIT 5"}),
            )]),
            ChatMessage::assistant("Paracetamol is the top seller."),
        ]));
        let agent = SqlAgent::new(model.clone(), Arc::new(FakeDatabase), 25);

        let steps: Vec<AgentStep> = collect(&agent, "Top medicine?")
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let roles: Vec<_> = steps.iter().map(|s| s.role).collect();
        assert_eq!(roles, ["user", "assistant", "tool", "assistant", "tool", "assistant"]);
        assert_eq!(steps[0].content, "Top medicine?");
        assert_eq!(steps[1].tool_calls, ["sql_db_list_tables"]);
        assert_eq!(steps[2].content, "customers, inventory, medicines, sales");
        assert!(steps[4].content.contains("Paracetamol"));
        assert_eq!(steps.last().unwrap().content, "Paracetamol is the top seller.");

        // 第二次调用时模型能看到工具结果
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0][0].role(), "system");
        assert!(seen[0][0].content().contains("PostgreSQL"));
        assert_eq!(
            seen[1].last().unwrap(),
            &ChatMessage::tool("c1", "customers, inventory, medicines, sales")
        );
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_to_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_reply(vec![
                ToolCall::new("c1", "sql_db_query", json!({"query": "SELECT nope FROM sales"})),
                ToolCall::new("c2", "sql_db_schema", json!({"table_names": "sales, ghosts"})),
                ToolCall::new("c3", "drop_everything", json!({})),
            ]),
            ChatMessage::assistant("I could not answer that."),
        ]));
        let agent = SqlAgent::new(model.clone(), Arc::new(FakeDatabase), 25);
        let steps = collect(&agent, "?").await;
        assert!(steps.iter().all(Result::is_ok));

        let seen = model.seen.lock().unwrap();
        let tool_outputs: Vec<&str> = seen[1]
            .iter()
            .filter(|m| m.role() == "tool")
            .map(ChatMessage::content)
            .collect();
        assert_eq!(tool_outputs.len(), 3);
        assert!(tool_outputs[0].starts_with("Error: "));
        assert!(tool_outputs[0].contains("column does not exist"));
        assert!(tool_outputs[1].contains("ghosts"));
        assert_eq!(tool_outputs[2], "Error: unknown tool `drop_everything`");
    }

    #[tokio::test]
    async fn malformed_arguments_do_not_abort_the_run() {
        let bad = ToolCall {
            id: "c1".into(),
            kind: "function".into(),
            function: FunctionCall {
                name: "sql_db_query".into(),
                arguments: "{not json".into(),
            },
        };
        let model = Arc::new(ScriptedModel::new(vec![
            tool_reply(vec![bad]),
            ChatMessage::assistant("retrying failed"),
        ]));
        let agent = SqlAgent::new(model.clone(), Arc::new(FakeDatabase), 25);
        let steps = collect(&agent, "?").await;

        assert!(steps[2].as_ref().unwrap().content.starts_with("Error: invalid tool arguments"));
        assert_eq!(steps.last().unwrap().as_ref().unwrap().content, "retrying failed");
    }

    #[tokio::test]
    async fn query_checker_asks_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![ChatMessage::assistant(
            "SELECT name FROM medicines LIMIT 5",
        )]));
        let agent = SqlAgent::new(model.clone(), Arc::new(FakeDatabase), 25);

        let checked = agent
            .toolkit()
            .call("sql_db_query_checker", r#"{"query": "SELECT name FROM medicines"}"#)
            .await
            .unwrap();
        assert_eq!(checked, "SELECT name FROM medicines LIMIT 5");

        let seen = model.seen.lock().unwrap();
        assert!(seen[0][0].content().starts_with("SELECT name FROM medicines\nDouble check"));
    }

    #[tokio::test]
    async fn toolkit_exposes_the_four_database_tools() {
        let agent = SqlAgent::new(Arc::new(ScriptedModel::new(vec![])), Arc::new(FakeDatabase), 25);
        assert_eq!(
            agent.toolkit().names(),
            ["sql_db_query", "sql_db_schema", "sql_db_list_tables", "sql_db_query_checker"]
        );
        let specs = agent.toolkit().specs();
        assert_eq!(specs[1].function.parameters["required"], json!(["table_names"]));
    }

    #[tokio::test]
    async fn stops_at_recursion_limit() {
        let looping: Vec<ChatMessage> = (0..10)
            .map(|i| tool_reply(vec![ToolCall::new(format!("c{i}"), "sql_db_list_tables", json!({}))]))
            .collect();
        let agent = SqlAgent::new(Arc::new(ScriptedModel::new(looping)), Arc::new(FakeDatabase), 4);

        let steps = collect(&agent, "loop forever").await;
        let last = steps.last().unwrap();
        assert!(matches!(last, Err(AgentError::RecursionLimit(4))));
        // user, assistant, tool, assistant, tool, 然后报错
        assert_eq!(steps.iter().filter(|s| s.is_ok()).count(), 5);
    }

    #[tokio::test]
    async fn model_failure_ends_the_stream_with_an_error() {
        let agent = SqlAgent::new(Arc::new(ScriptedModel::new(vec![])), Arc::new(FakeDatabase), 25);
        let steps = collect(&agent, "anything").await;
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[1], Err(AgentError::Llm(LlmError::EmptyResponse))));
    }
}
