use std::env;
use std::path::PathBuf;
use std::time::Duration;

// 旧版本使用的 API Key 变量名，仍然兼容
const LEGACY_API_KEY_VAR: &str = "KEY_FOR_OPENAI_LEARNING_LANGCHAIN";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    pub db_port: u16,
    pub default_db: String,
    pub openai_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: Option<f32>,
    pub llm_timeout_secs: u64,
    pub agent_recursion_limit: usize,
    pub usage_log: PathBuf,
    pub daily_limit: u32,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key))
    }

    /// 从任意 key/value 来源构建配置，`from_env` 与测试共用
    pub fn from_lookup<F>(var: F) -> Result<Self, env::VarError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|_| default.to_string());

        // 空字符串视为未设置温度，部分模型只接受默认温度
        let llm_temperature = match var("LLM_TEMPERATURE") {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => Some(raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid LLM_TEMPERATURE {:?}, using 0.0", raw);
                0.0
            })),
            Err(_) => Some(0.0),
        };

        Ok(Config {
            db_user: or("DB_USER", "postgres"),
            db_password: var("DB_PASSWORD")?,
            db_host: or("DB_HOST", "localhost"),
            db_port: or("DB_PORT", "5432").parse().unwrap_or(5432),
            default_db: or("DEFAULT_DB", "pharmacy"),
            openai_api_key: var("OPENAI_API_KEY")
                .or_else(|_| var(LEGACY_API_KEY_VAR))
                .ok()
                .filter(|key| !key.trim().is_empty()),
            llm_base_url: or("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_model: or("LLM_MODEL", "gpt-5-nano"),
            llm_temperature,
            llm_timeout_secs: or("LLM_TIMEOUT_SECS", "120").parse().unwrap_or(120),
            agent_recursion_limit: or("AGENT_RECURSION_LIMIT", "25").parse().unwrap_or(25),
            usage_log: PathBuf::from(or("USAGE_LOG", "/tmp/openai_usage.json")),
            daily_limit: or("DAILY_LIMIT", "1").parse().unwrap_or(1),
            server_host: or("SERVER_HOST", "0.0.0.0"),
            server_port: or("SERVER_PORT", "8000").parse().unwrap_or(8000),
        })
    }

    /// 指定数据库名的连接串，密码和库名做 URL 编码
    pub fn database_url(&self, db_name: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user,
            urlencoding::encode(&self.db_password),
            self.db_host,
            self.db_port,
            urlencoding::encode(db_name)
        )
    }

    pub fn default_database_url(&self) -> String {
        self.database_url(&self.default_db)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// 助手面板（客户端）配置
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub ask_url: String,
    pub default_db: String,
    pub timeout_secs: u64,
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key))
    }

    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        AssistantConfig {
            ask_url: var("ASSISTANT_URL").unwrap_or_else(|_| "http://localhost:8000/ask".into()),
            default_db: var("DEFAULT_DB").unwrap_or_else(|_| "pharmacy".into()),
            timeout_secs: var("ASSISTANT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
