//! 仪表盘侧边栏里的 AI 助手：维护对话记录，把问题转发给 `/ask` 接口

use std::fmt;

use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::config::AssistantConfig;
use crate::routes::ask::QueryRequest;

pub const NO_ANSWER: &str = "❌ No answer received.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "🧑‍💼 You"),
            ChatRole::Assistant => write!(f, "🤖 Assistant"),
        }
    }
}

pub struct AskClient {
    http: HttpClient,
    ask_url: String,
    db_name: String,
}

impl AskClient {
    pub fn new(config: &AssistantConfig) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            ask_url: config.ask_url.clone(),
            db_name: config.default_db.clone(),
        })
    }

    /// 返回要展示给用户的文本；只有传输层错误才返回 Err
    pub async fn ask(&self, question: &str) -> Result<String, reqwest::Error> {
        let response = self
            .http
            .post(&self.ask_url)
            .query(&[("db_name", self.db_name.as_str())])
            .json(&QueryRequest {
                question: question.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let data: Value = response.json().await?;
            Ok(data
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or(NO_ANSWER)
                .to_string())
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(format!("⚠️ Error: {} - {}", status.as_u16(), body))
        }
    }
}

/// 助手面板状态：是否展开，以及对话记录
pub struct AssistantPanel {
    client: AskClient,
    open: bool,
    history: Vec<(ChatRole, String)>,
}

impl AssistantPanel {
    pub fn new(client: AskClient) -> Self {
        Self {
            client,
            open: false,
            history: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn button_label(&self) -> &'static str {
        if self.open {
            "❌ Close Assistant"
        } else {
            "🤖 AI Assistant"
        }
    }

    pub fn history(&self) -> &[(ChatRole, String)] {
        &self.history
    }

    /// 发送一条问题，返回助手的回复；空白输入不发送
    pub async fn send(&mut self, input: &str) -> Option<&str> {
        if input.trim().is_empty() {
            return None;
        }

        self.history.push((ChatRole::User, input.to_string()));
        let answer = match self.client.ask(input).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("assistant request failed: {}", e);
                format!("💥 Connection error: {}", e)
            }
        };
        self.history.push((ChatRole::Assistant, answer));
        self.history.last().map(|(_, text)| text.as_str())
    }

    pub fn transcript(&self) -> String {
        self.history
            .iter()
            .map(|(role, text)| format!("{}: {}", role, text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
